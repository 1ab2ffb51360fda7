//! HTTP Handlers

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use retail_insights::QueryRequest;

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub tool_model: String,
    pub agent_model: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryInput {
    /// The retail insights question
    pub input: String,
    #[serde(default)]
    pub tool_llm_name: Option<String>,
    #[serde(default)]
    pub agent_llm_name: Option<String>,
    /// Oldest first, `"<sender>: <text>"`
    #[serde(default)]
    pub chat_history: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryOutput {
    pub output: String,
    pub tokens_used: u64,
    pub cost: f64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the Retail Insights Chatbot API",
    })
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        tool_model: state.default_tool_model.to_string(),
        agent_model: state.default_agent_model.to_string(),
    })
}

/// Answer one retail insights question
pub async fn query_handler(
    State(state): State<AppState>,
    Json(payload): Json<QueryInput>,
) -> Result<Json<QueryOutput>, (StatusCode, Json<ErrorResponse>)> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("request", id = %request_id);

    async move {
        tracing::info!(query = %payload.input, "received query");
        tracing::debug!(history = ?payload.chat_history, "chat history");

        let request = QueryRequest {
            question: payload.input,
            tool_model: payload
                .tool_llm_name
                .unwrap_or_else(|| state.default_tool_model.to_string()),
            agent_model: payload
                .agent_llm_name
                .unwrap_or_else(|| state.default_agent_model.to_string()),
            chat_history: payload.chat_history,
        };

        match state.service.answer(request).await {
            Ok(answer) => Ok(Json(QueryOutput {
                output: answer.output,
                tokens_used: answer.tokens_used,
                cost: answer.cost,
            })),
            Err(e) => {
                tracing::error!(error = %e, "error processing query");
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { detail: e.detail() }),
                ))
            }
        }
    }
    .instrument(span)
    .await
}
