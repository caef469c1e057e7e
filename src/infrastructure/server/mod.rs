pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

use axum::Json;
use axum::routing::get;
use dto::{ErrorResponse, StatusResponse};
use state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use utoipa::OpenApi;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server terminated: {0}")]
    Serve(std::io::Error),
}

#[derive(OpenApi)]
#[openapi(
    paths(root, routes::session::session_token, routes::session::get_mails),
    components(schemas(
        crate::domain::types::MailboxReport,
        crate::domain::types::EmailRecord,
        crate::domain::types::AttachmentInfo,
        ErrorResponse,
        StatusResponse,
    )),
    tags((name = "session", description = "Voice session tokens and mailbox retrieval"))
)]
struct ApiDoc;

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/",
    tag = "session",
    responses((status = 200, description = "Service is up", body = StatusResponse))
)]
async fn root() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

async fn openapi_doc() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router(state: Arc<ServerState>) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    axum::Router::new()
        .route("/", get(root))
        .route("/session", get(routes::session::session_token))
        .route("/session/get-mails", get(routes::session::get_mails))
        .route("/api-doc/openapi.json", get(openapi_doc))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: Arc<ServerState>, addr: SocketAddr) -> Result<(), ServerError> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.map_err(ServerError::Serve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use error::error_chain;

    #[test]
    fn serve_error_renders_its_cause_once() {
        let err = ServerError::Serve(std::io::Error::other("socket closed"));
        assert_eq!(error_chain(&err), "server terminated: socket closed");
    }
}
