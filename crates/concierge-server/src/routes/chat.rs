use crate::state::AppState;
use axum::{extract::State, routing::post, Json, Router};
use concierge::{transcript::turns_from_values, ChatOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    /// Prior turns as the widget reports them: role/content records or `[user, assistant]` pairs
    #[serde(default)]
    history: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    #[serde(flatten)]
    outcome: ChatOutcome,
    /// What the widget should show as the assistant's message
    display: String,
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let history = turns_from_values(&request.history);
    if history.len() != request.history.len() {
        tracing::debug!(
            received = request.history.len(),
            kept = history.len(),
            "dropped malformed history entries"
        );
    }

    let outcome = state.agent.chat(&request.message, &history).await;
    let display = outcome.render();
    Json(ChatResponse { outcome, display })
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handler))
        .with_state(state)
}
