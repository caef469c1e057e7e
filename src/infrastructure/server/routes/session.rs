use super::super::dto::ErrorResponse;
use super::super::state::ServerState;
use crate::constants::REALTIME_SESSIONS_URL;
use crate::domain::types::MailboxReport;
use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// Proxy an ephemeral realtime-session token request to the upstream API
/// using the server-held credential.
#[utoipa::path(
    get,
    path = "/session",
    tag = "session",
    responses(
        (status = 200, description = "Upstream session token", body = Object),
        (status = 500, description = "Missing credential or upstream failure", body = ErrorResponse)
    )
)]
pub async fn session_token(State(state): State<Arc<ServerState>>) -> Response {
    let config = state.config();
    let api_key = match config.require_api_key() {
        Ok(key) => key.to_string(),
        Err(err) => {
            error!(%err, "rejecting /session request");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                    kind: Some("configuration_error"),
                    traceback: None,
                }),
            )
                .into_response();
        }
    };

    let payload = json!({
        "model": config.realtime_model,
        "voice": config.realtime_voice,
    });

    match state
        .http()
        .post(REALTIME_SESSIONS_URL)
        .bearer_auth(api_key)
        .json(&payload)
        .send()
        .await
    {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            info!(%status, "forwarding upstream session response");
            let body = upstream.text().await.unwrap_or_default();
            (
                status,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }
        Err(err) => {
            error!(%err, "upstream session request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::message(err.to_string())),
            )
                .into_response()
        }
    }
}

/// Run the full retrieval pipeline: spawn the Gmail tool server, drive the
/// agent, and return the validated five most recent messages.
#[utoipa::path(
    get,
    path = "/session/get-mails",
    tag = "session",
    responses(
        (status = 200, description = "Validated mailbox report", body = MailboxReport),
        (status = 500, description = "Session failed", body = ErrorResponse)
    )
)]
pub async fn get_mails(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<MailboxReport>, (StatusCode, Json<ErrorResponse>)> {
    info!("received /session/get-mails request");
    match state.sessions().run_email_retrieval().await {
        Ok(report) => Ok(Json(report)),
        Err(err) => {
            error!(kind = err.kind(), %err, "mailbox retrieval failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::from(&err)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::agent::{ChatMessage, Reasoner, ReasonerError};
    use crate::application::session::SessionService;
    use crate::config::{AppConfig, ToolServerConfig};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct SilentReasoner;

    #[async_trait]
    impl Reasoner for SilentReasoner {
        async fn next_action(&self, _messages: &[ChatMessage]) -> Result<String, ReasonerError> {
            Err(ReasonerError::InvalidResponse("never reached".into()))
        }
    }

    fn state_without_credentials() -> Arc<ServerState> {
        let config = Arc::new(AppConfig {
            api_key: None,
            model: "gpt-4o".into(),
            realtime_model: "gpt-4o-realtime-preview".into(),
            realtime_voice: "coral".into(),
            tool_server: ToolServerConfig {
                name: "gmail".into(),
                command: "npx".into(),
                args: Vec::new(),
                env: Vec::new(),
            },
            credential_paths: vec![PathBuf::from("/nonexistent/gcp-oauth.keys.json")],
        });
        let sessions = SessionService::new(Arc::clone(&config), Arc::new(SilentReasoner));
        Arc::new(ServerState::new(config, reqwest::Client::new(), sessions))
    }

    #[tokio::test]
    async fn get_mails_reports_configuration_error_before_spawning() {
        let state = state_without_credentials();
        let (status, Json(body)) = get_mails(State(state))
            .await
            .expect_err("unconfigured service fails");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.kind, Some("configuration_error"));
        assert!(body.traceback.is_some());
    }

    #[tokio::test]
    async fn session_token_requires_api_key() {
        let state = state_without_credentials();
        let response = session_token(State(state)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
