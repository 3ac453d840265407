use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use relay::adapters::slack::{verify_signature, SlackEnvelope, SlackMessage};
use serde_json::{json, Value};
use tracing::{error, info, warn};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, StatusCode> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)
}

async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, StatusCode> {
    let Some(wiki) = state.wiki.clone() else {
        return Err(StatusCode::NOT_FOUND);
    };

    let timestamp = header(&headers, "x-slack-request-timestamp")?;
    let signature = header(&headers, "x-slack-signature")?;
    verify_signature(
        &wiki.signing_secret,
        timestamp,
        &body,
        signature,
        chrono::Utc::now().timestamp(),
    )
    .map_err(|e| {
        warn!(error = %e, "rejected Slack request");
        StatusCode::UNAUTHORIZED
    })?;

    let envelope: SlackEnvelope =
        serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?;

    let event = match envelope {
        SlackEnvelope::UrlVerification { challenge } => {
            return Ok(Json(json!({ "challenge": challenge })).into_response());
        }
        SlackEnvelope::EventCallback { event } => event,
        SlackEnvelope::Other => return Ok(StatusCode::OK.into_response()),
    };

    // Slack redelivers events it thinks timed out; the first delivery is already being handled
    if headers.contains_key("x-slack-retry-num") {
        info!("ignoring Slack retry");
        return Ok(StatusCode::OK.into_response());
    }
    if event.get("type").and_then(Value::as_str) != Some("message") {
        return Ok(StatusCode::OK.into_response());
    }
    let message: SlackMessage =
        serde_json::from_value(event).map_err(|_| StatusCode::BAD_REQUEST)?;

    let thread = format!("{}:{}", message.channel, message.reply_thread_ts());
    let lock = state.threads.lock_for(&thread);
    tokio::spawn(async move {
        let _turn = lock.lock().await;
        match wiki.bot.handle_message(wiki.platform.as_ref(), &message).await {
            Ok(handled) => info!(?handled, thread = %thread, "Slack message handled"),
            Err(e) => error!(error = %e, thread = %thread, "Error handling Slack message"),
        }
    });

    Ok(StatusCode::OK.into_response())
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/slack/events", post(events))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{app_state, wiki_state, CannedProvider, RecordingSlack, SIGNING_SECRET};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use relay::adapters::slack::sign;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn signed_request(body: &Value, secret: &str) -> Request<Body> {
        let body = body.to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(secret, &timestamp, body.as_bytes()).unwrap();
        Request::post("/slack/events")
            .header("content-type", "application/json")
            .header("x-slack-request-timestamp", timestamp)
            .header("x-slack-signature", signature)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_url_verification_echoes_challenge() {
        let state = wiki_state(CannedProvider::replying("unused"), Arc::default());
        let response = routes(state)
            .oneshot(signed_request(
                &json!({"type": "url_verification", "challenge": "abc123"}),
                SIGNING_SECRET,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"challenge": "abc123"}));
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected() {
        let state = wiki_state(CannedProvider::replying("unused"), Arc::default());
        let response = routes(state)
            .oneshot(signed_request(
                &json!({"type": "url_verification", "challenge": "abc123"}),
                "wrong-secret",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_wiki_is_not_found() {
        let response = routes(app_state(CannedProvider::replying("unused")))
            .oneshot(signed_request(&json!({"type": "url_verification"}), SIGNING_SECRET))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_direct_message_is_answered_in_background() {
        let slack = Arc::new(RecordingSlack::default());
        let state = wiki_state(CannedProvider::replying("Doors open at **9am**."), slack.clone());

        let response = routes(state)
            .oneshot(signed_request(
                &json!({
                    "type": "event_callback",
                    "event": {
                        "type": "message",
                        "channel": "D1",
                        "channel_type": "im",
                        "user": "U1",
                        "text": "when does the office open?",
                        "ts": "1700000000.000100"
                    }
                }),
                SIGNING_SECRET,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut sent = Vec::new();
        for _ in 0..50 {
            sent = slack.sent.lock().unwrap().clone();
            if !sent.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(
            sent,
            vec![(
                "D1".to_string(),
                "1700000000.000100".to_string(),
                "Doors open at *9am*.".to_string()
            )]
        );
    }
}
