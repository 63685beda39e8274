//! The research prompt: a system template partially applied with the
//! response schema's format instructions, followed by the chat history,
//! the user's query and the agent scratchpad.

use crate::error::Error;
use crate::message::Message;
use crate::Result;

pub const DEFAULT_SYSTEM_TEMPLATE: &str = "You are a research assistant that will help generate a research paper.
Answer the user query and use the necessary tools.
Wrap the output in this format and provide no other text
{format_instructions}";

const FORMAT_PLACEHOLDER: &str = "{format_instructions}";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    system: String,
}

impl PromptTemplate {
    /// Build a template from a system text containing `{format_instructions}`.
    ///
    /// A text without the placeholder is rejected, since the agent would
    /// otherwise run without the response schema.
    pub fn new(system_template: impl Into<String>) -> Result<Self> {
        let system = system_template.into();
        if !system.contains(FORMAT_PLACEHOLDER) {
            return Err(Error::config(format!(
                "system prompt must contain the {} placeholder",
                FORMAT_PLACEHOLDER
            )));
        }
        Ok(Self { system })
    }

    /// Fill the `{format_instructions}` placeholder once, up front.
    pub fn partial(mut self, format_instructions: &str) -> Self {
        self.system = self.system.replace(FORMAT_PLACEHOLDER, format_instructions);
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    /// Render the full message list for one agent turn.
    pub fn render(&self, query: &str, chat_history: &[Message], scratchpad: &[Message]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2 + chat_history.len() + scratchpad.len());
        messages.push(Message::system(self.system.as_str()));
        messages.extend_from_slice(chat_history);
        messages.push(Message::user(query));
        messages.extend_from_slice(scratchpad);
        messages
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_TEMPLATE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Role, ToolCall};
    use crate::schema::ResponseSchema;

    #[test]
    fn test_partial_embeds_format_instructions() {
        let instructions = ResponseSchema.format_instructions();
        let template = PromptTemplate::default().partial(&instructions);
        assert!(template.system_prompt().contains(&instructions));
        assert!(!template.system_prompt().contains(FORMAT_PLACEHOLDER));
    }

    #[test]
    fn test_default_template_has_placeholder() {
        assert!(PromptTemplate::new(DEFAULT_SYSTEM_TEMPLATE).is_ok());
    }

    #[test]
    fn test_rejects_template_without_placeholder() {
        let err = PromptTemplate::new("You are a research assistant.").unwrap_err();
        assert!(matches!(&err, Error::Config(msg) if msg.contains("{format_instructions}")));
    }

    #[test]
    fn test_render_order() {
        let template = PromptTemplate::new("sys {format_instructions}").unwrap().partial("FMT");
        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let scratchpad = vec![
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("c1", "search", serde_json::json!({"query": "aqueducts"}))],
            ),
            Message::tool_result("c1", "search", "results"),
        ];

        let messages = template.render("aqueducts", &history, &scratchpad);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant, Role::Tool]
        );
        assert_eq!(messages[0].content.as_text(), Some("sys FMT"));
        assert_eq!(messages[3].content.as_text(), Some("aqueducts"));
    }
}
