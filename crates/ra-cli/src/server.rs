//! The web form: a single page that posts queries to `/research`.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use ra_core::{ClassifiedError, ResearchPipeline, ResearchResponse};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<ResearchPipeline>,
}

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    query: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub raw: Option<String>,
}

enum ApiError {
    Pipeline(ClassifiedError),
    InvalidRequest(JsonRejection),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Pipeline(ClassifiedError::EmptyQuery) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(ClassifiedError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Pipeline(
                ClassifiedError::ApiError { .. }
                | ClassifiedError::UnexpectedOutputShape { .. }
                | ClassifiedError::SchemaValidation { .. },
            ) => StatusCode::BAD_GATEWAY,
            ApiError::InvalidRequest(rejection) => rejection.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Pipeline(err) => ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
                raw: err.raw().map(str::to_string),
            },
            ApiError::InvalidRequest(rejection) => ErrorBody {
                kind: "invalid_request".to_string(),
                message: rejection.body_text(),
                raw: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(pipeline: Arc<ResearchPipeline>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/research", post(research))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { pipeline })
}

pub async fn serve(pipeline: Arc<ResearchPipeline>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(address = %bind, "Research assistant listening");
    eprintln!("Research assistant running on http://{}", bind);

    axum::serve(listener, router(pipeline))
        .await
        .context("Server error")?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[instrument(skip(state, payload))]
async fn research(
    State(state): State<AppState>,
    payload: Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection, "Rejected research request body");
        ApiError::InvalidRequest(rejection)
    })?;

    state
        .pipeline
        .run_query(&request.query)
        .await
        .map(Json)
        .map_err(ApiError::Pipeline)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>AI Research Assistant</title>
    <style>
        body {
            font-family: Arial, sans-serif;
            max-width: 800px;
            margin: 0 auto;
            padding: 20px;
        }
        textarea {
            width: 100%;
            height: 100px;
            padding: 10px;
            box-sizing: border-box;
        }
        button {
            margin-top: 10px;
            padding: 10px 20px;
            background-color: #007bff;
            color: white;
            border: none;
            border-radius: 4px;
            cursor: pointer;
        }
        button:disabled {
            background-color: #6c757d;
        }
        #loading {
            display: none;
            margin-top: 10px;
            color: #555;
        }
        #message {
            display: none;
            margin-top: 20px;
            padding: 10px;
            border-radius: 4px;
            background-color: #fff3cd;
        }
        #message.error {
            background-color: #f8d7da;
        }
        #message pre {
            white-space: pre-wrap;
        }
        #result {
            display: none;
            margin-top: 20px;
        }
    </style>
</head>
<body>
    <h1>AI Research Assistant</h1>
    <label for="query">What can I help you research?</label>
    <textarea id="query" placeholder="e.g. The history of Roman aqueducts"></textarea>
    <button id="search" onclick="runResearch()">Search</button>
    <div id="loading">Researching...</div>
    <div id="message"></div>
    <div id="result">
        <h2>Summary</h2>
        <p id="summary"></p>
        <h2>Sources</h2>
        <ul id="sources"></ul>
        <h2>Tools Used</h2>
        <p id="tools"></p>
    </div>
    <script>
        function showMessage(text, isError, raw) {
            const box = document.getElementById('message');
            box.textContent = text;
            box.className = isError ? 'error' : '';
            if (raw) {
                const pre = document.createElement('pre');
                pre.textContent = raw;
                box.appendChild(pre);
            }
            box.style.display = 'block';
        }

        function showResult(data) {
            document.getElementById('summary').textContent = data.summary;
            const sources = document.getElementById('sources');
            sources.innerHTML = '';
            for (const source of data.sources) {
                const li = document.createElement('li');
                li.textContent = source;
                sources.appendChild(li);
            }
            document.getElementById('tools').textContent = data.tools_used.join(', ');
            document.getElementById('result').style.display = 'block';
        }

        async function runResearch() {
            const query = document.getElementById('query').value;
            document.getElementById('message').style.display = 'none';
            document.getElementById('result').style.display = 'none';

            if (!query.trim()) {
                showMessage('Please enter a query to start research.', false);
                return;
            }

            const button = document.getElementById('search');
            const loading = document.getElementById('loading');
            button.disabled = true;
            loading.style.display = 'block';

            try {
                const response = await fetch('/research', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ query }),
                });
                const data = await response.json();
                if (response.ok) {
                    showResult(data);
                } else {
                    showMessage(data.message, true, data.raw);
                }
            } catch (err) {
                showMessage('Request failed: ' + err, true);
            } finally {
                button.disabled = false;
                loading.style.display = 'none';
            }
        }
    </script>
</body>
</html>
"#;
