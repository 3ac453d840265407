use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use relay::adapters::widget::{from_conversation, to_conversation, WidgetMessage};
use relay::errors::TurnError;
use relay::models::role::Role;
use relay::pipeline::APOLOGY;
use relay::tools::Artifact;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct FlightRequest {
    #[serde(default)]
    history: Vec<WidgetMessage>,
    message: String,
}

#[derive(Debug, Serialize)]
struct FlightResponse {
    reply: String,
    history: Vec<WidgetMessage>,
    /// Destination image as a data URL
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

fn data_url(artifact: Artifact) -> String {
    match artifact {
        Artifact::Image { data, mime_type } => {
            format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
        }
    }
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<FlightRequest>,
) -> Result<Json<FlightResponse>, StatusCode> {
    let history = to_conversation(&request.history);

    match state.flight.chat(history, &request.message).await {
        Ok(outcome) => Ok(Json(FlightResponse {
            reply: outcome.reply,
            history: from_conversation(&outcome.conversation),
            image: outcome.artifact.map(data_url),
        })),
        Err(failure) if matches!(failure.error, TurnError::EmptyMessage) => {
            Err(StatusCode::BAD_REQUEST)
        }
        Err(failure) => {
            tracing::error!(error = %failure, "flight turn failed");
            let mut history = from_conversation(&failure.conversation);
            history.push(WidgetMessage::new(Role::Assistant, APOLOGY));
            Ok(Json(FlightResponse {
                reply: APOLOGY.to_string(),
                history,
                image: None,
            }))
        }
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/flight/reply", post(handler))
        .with_state(state)
}
