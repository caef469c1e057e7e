use super::dto::ErrorResponse;
use crate::application::session::SessionError;

/// Render an error and its `source` chain the way operators expect to read
/// it, outermost first.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        rendered.push_str("\ncaused by: ");
        rendered.push_str(&source.to_string());
        current = source.source();
    }
    rendered
}

impl From<&SessionError> for ErrorResponse {
    fn from(err: &SessionError) -> Self {
        ErrorResponse {
            error: err.to_string(),
            kind: Some(err.kind()),
            traceback: Some(error_chain(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::gateway::GatewayError;

    #[test]
    fn chain_includes_sources() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "npx vanished");
        let err = GatewayError::Spawn {
            server: "gmail".into(),
            source: inner,
        };
        let rendered = error_chain(&err);
        assert!(rendered.contains("failed to spawn tool server"));
        assert!(rendered.contains("caused by: npx vanished"));
    }

    #[test]
    fn session_error_maps_to_typed_body() {
        let err = SessionError::DeadlineExceeded(std::time::Duration::from_secs(240));
        let body = ErrorResponse::from(&err);
        assert_eq!(body.kind, Some("session_deadline_exceeded"));
        assert!(body.traceback.is_some());
    }
}
