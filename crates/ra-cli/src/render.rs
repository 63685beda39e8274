//! Terminal rendering of research results.

use ra_core::{ClassifiedError, ResearchResponse};

pub const QUERY_PROMPT: &str = "What can i help you research? ";

pub fn format_response(response: &ResearchResponse) -> String {
    let mut out = String::new();

    out.push_str("Summary\n");
    out.push_str(&response.summary);
    out.push_str("\n\nSources\n");
    if response.sources.is_empty() {
        out.push_str("(none)\n");
    }
    for source in &response.sources {
        out.push_str(&format!("- {}\n", source));
    }

    out.push_str("\nTools Used\n");
    if response.tools_used.is_empty() {
        out.push_str("(none)");
    } else {
        out.push_str(&response.tools_used.join(", "));
    }
    out.push('\n');

    out
}

/// The user-facing message, plus the model's raw text when parsing failed.
pub fn format_error(error: &ClassifiedError) -> String {
    match error.raw() {
        Some(raw) => format!("{}\n\nRaw response:\n{}", error, raw),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_response() {
        let response = ResearchResponse {
            topic: "Roman aqueducts".to_string(),
            summary: "Water, carried far.".to_string(),
            sources: vec!["https://a.example".to_string(), "https://b.example".to_string()],
            tools_used: vec!["search".to_string(), "wikipedia".to_string()],
        };

        assert_eq!(
            format_response(&response),
            "Summary\nWater, carried far.\n\nSources\n- https://a.example\n- https://b.example\n\nTools Used\nsearch, wikipedia\n"
        );
    }

    #[test]
    fn test_format_empty_lists() {
        let response = ResearchResponse {
            topic: "t".to_string(),
            summary: "s".to_string(),
            sources: vec![],
            tools_used: vec![],
        };

        let text = format_response(&response);
        assert!(text.contains("Sources\n(none)\n"));
        assert!(text.ends_with("Tools Used\n(none)\n"));
    }

    #[test]
    fn test_format_errors() {
        let err = ClassifiedError::RateLimited {
            message: "429".to_string(),
        };
        assert_eq!(
            format_error(&err),
            "API limit reached or model is busy. Please try again later."
        );

        let err = ClassifiedError::SchemaValidation {
            message: "missing field `topic`".to_string(),
            raw: "not json".to_string(),
        };
        assert!(format_error(&err).ends_with("Raw response:\nnot json"));
    }
}
