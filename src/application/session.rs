use crate::application::agent::{AgentError, AgentRuntime, Reasoner};
use crate::application::gateway::{GatewayError, ToolGateway};
use crate::config::{AppConfig, ConfigError};
use crate::constants::{MAILBOX_INSTRUCTIONS, SESSION_DEADLINE};
use crate::domain::types::MailboxReport;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Agent(AgentError),
    #[error("session exceeded its overall deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl SessionError {
    fn from_agent(err: AgentError) -> Self {
        match err {
            // Keep gateway failures in one bucket regardless of where they
            // surfaced.
            AgentError::Gateway(gateway) => SessionError::Gateway(gateway),
            other => SessionError::Agent(other),
        }
    }

    /// Stable error kind string for the HTTP error body.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Configuration(_) => "configuration_error",
            SessionError::Gateway(GatewayError::Spawn { .. }) => "spawn_error",
            SessionError::Gateway(GatewayError::HandshakeTimeout { .. }) => "handshake_timeout",
            SessionError::Gateway(GatewayError::ToolTimeout { .. }) => "tool_timeout",
            SessionError::Gateway(
                GatewayError::Tool { .. }
                | GatewayError::UnknownTool { .. }
                | GatewayError::InvalidArguments { .. },
            ) => "tool_error",
            SessionError::Gateway(_) => "protocol_error",
            SessionError::Agent(AgentError::TurnBudgetExceeded { .. }) => "turn_budget_exceeded",
            SessionError::Agent(AgentError::OutputContract(_)) => "output_contract_violation",
            SessionError::Agent(_) => "model_error",
            SessionError::DeadlineExceeded(_) => "session_deadline_exceeded",
        }
    }
}

/// The externally visible operation: one request, one gateway, one agent run,
/// guaranteed teardown.
pub struct SessionService {
    config: Arc<AppConfig>,
    reasoner: Arc<dyn Reasoner>,
    deadline: Duration,
}

impl SessionService {
    pub fn new(config: Arc<AppConfig>, reasoner: Arc<dyn Reasoner>) -> Self {
        Self::with_deadline(config, reasoner, SESSION_DEADLINE)
    }

    pub fn with_deadline(
        config: Arc<AppConfig>,
        reasoner: Arc<dyn Reasoner>,
        deadline: Duration,
    ) -> Self {
        Self {
            config,
            reasoner,
            deadline,
        }
    }

    /// Spawn a fresh tool server, run the mailbox-retrieval agent against it,
    /// and release the gateway on every exit path before reporting.
    pub async fn run_email_retrieval(&self) -> Result<MailboxReport, SessionError> {
        self.config.validate()?;

        let session_id = Uuid::new_v4();
        info!(%session_id, "starting mailbox retrieval session");

        let gateway = Arc::new(ToolGateway::new(self.config.tool_server.clone()));
        let outcome = self.drive(Arc::clone(&gateway)).await;
        gateway.close().await;

        match &outcome {
            Ok(report) => {
                info!(%session_id, emails = report.emails.len(), "session completed");
            }
            Err(err) => {
                error!(%session_id, kind = err.kind(), %err, "session failed");
            }
        }
        outcome
    }

    /// The deadline covers the whole pipeline: spawn, handshake, and every
    /// agent turn.
    async fn drive(&self, gateway: Arc<ToolGateway>) -> Result<MailboxReport, SessionError> {
        let pipeline = async {
            gateway.start().await?;
            let agent = AgentRuntime::new(Arc::clone(&self.reasoner), gateway);
            agent
                .run(MAILBOX_INSTRUCTIONS)
                .await
                .map_err(SessionError::from_agent)
        };

        match timeout(self.deadline, pipeline).await {
            Ok(outcome) => outcome,
            // Whatever was in flight is simply abandoned here; the close() in
            // the caller reclaims the process.
            Err(_) => Err(SessionError::DeadlineExceeded(self.deadline)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::agent::{ChatMessage, ReasonerError};
    use crate::config::ToolServerConfig;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct SilentReasoner;

    #[async_trait]
    impl Reasoner for SilentReasoner {
        async fn next_action(&self, _messages: &[ChatMessage]) -> Result<String, ReasonerError> {
            Err(ReasonerError::InvalidResponse("never reached".into()))
        }
    }

    struct ScriptedReasoner {
        responses: Mutex<Vec<String>>,
    }

    impl ScriptedReasoner {
        fn new(responses: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl Reasoner for ScriptedReasoner {
        async fn next_action(&self, _messages: &[ChatMessage]) -> Result<String, ReasonerError> {
            Ok(self.responses.lock().expect("responses lock").remove(0))
        }
    }

    fn email(id: &str, received: &str) -> Value {
        json!({
            "email_id": id,
            "summary": "summary",
            "email_content": "body",
            "sender": "sender@example.com",
            "recipients": ["me@example.com"],
            "received_date": received,
            "subject": "subject",
            "attachments": []
        })
    }

    fn five_email_report() -> Value {
        json!({
            "emails": [
                email("a", "2025-04-25T14:30:00Z"),
                email("b", "2025-04-25T12:00:00Z"),
                email("c", "2025-04-24T09:00:00Z"),
                email("d", "2025-04-23T09:00:00Z"),
                email("e", "2025-04-22T09:00:00Z"),
            ]
        })
    }

    /// Shell script speaking the line protocol over its own stdio: answers the
    /// handshake, then one tools/call. Correlation ids are deterministic, the
    /// gateway numbers them from one.
    fn scripted_tool_server() -> String {
        let initialize = json!({
            "jsonrpc": "2.0",
            "id": "call-1",
            "result": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "serverInfo": { "name": "scripted-gmail" }
            }
        });
        let listing = json!({
            "jsonrpc": "2.0",
            "id": "call-2",
            "result": {
                "tools": [{
                    "name": "list_emails",
                    "description": "List recent inbox messages",
                    "inputSchema": {
                        "type": "object",
                        "properties": { "count": { "type": "integer" } },
                        "required": ["count"]
                    }
                }]
            }
        });
        let call = json!({
            "jsonrpc": "2.0",
            "id": "call-3",
            "result": {
                "content": [{ "type": "text", "text": "5 messages" }],
                "isError": false
            }
        });
        format!(
            "read line\nprintf '%s\\n' '{initialize}'\nread line\nread line\nprintf '%s\\n' '{listing}'\nread line\nprintf '%s\\n' '{call}'\n"
        )
    }

    fn configured(dir: &tempfile::TempDir) -> AppConfig {
        let credentials = dir.path().join("gcp-oauth.keys.json");
        std::fs::write(&credentials, "{}").expect("write credentials");
        let mut config = unconfigured();
        config.api_key = Some("sk-test".into());
        config.credential_paths = vec![credentials];
        config
    }

    fn unconfigured() -> AppConfig {
        AppConfig {
            api_key: None,
            model: "gpt-4o".into(),
            realtime_model: "gpt-4o-realtime-preview".into(),
            realtime_voice: "coral".into(),
            tool_server: ToolServerConfig {
                name: "gmail".into(),
                command: "definitely-not-a-real-binary".into(),
                args: Vec::new(),
                env: Vec::new(),
            },
            credential_paths: vec![PathBuf::from("/nonexistent/gcp-oauth.keys.json")],
        }
    }

    #[tokio::test]
    async fn configuration_errors_surface_before_any_spawn() {
        let service = SessionService::new(Arc::new(unconfigured()), Arc::new(SilentReasoner));
        let err = service
            .run_email_retrieval()
            .await
            .expect_err("nothing is configured");
        assert_eq!(err.kind(), "configuration_error");
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_as_spawn_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = configured(&dir);
        // A command that exists but exits immediately: the spawn succeeds and
        // the handshake then fails on the closed channel.
        config.tool_server.command = "false".into();

        let service = SessionService::new(Arc::new(config), Arc::new(SilentReasoner));
        let err = service
            .run_email_retrieval()
            .await
            .expect_err("child exits without a handshake");
        assert!(matches!(
            err.kind(),
            "protocol_error" | "handshake_timeout" | "spawn_error"
        ));
    }

    #[tokio::test]
    async fn retrieval_returns_five_emails_newest_first_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = configured(&dir);
        config.tool_server.command = "sh".into();
        config.tool_server.args = vec!["-c".into(), scripted_tool_server()];

        let reasoner = ScriptedReasoner::new(vec![
            r#"{"action":"call_tool","tool":"list_emails","input":{"count":5}}"#.to_string(),
            five_email_report().to_string(),
        ]);

        let service = SessionService::new(Arc::new(config), reasoner);
        let report = service
            .run_email_retrieval()
            .await
            .expect("session completes");

        let ids: Vec<&str> = report
            .emails
            .iter()
            .map(|record| record.email_id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b", "c", "d", "e"]);
        assert_eq!(report.emails[0].received_date, "2025-04-25T14:30:00Z");
    }

    #[tokio::test]
    async fn deadline_covers_spawn_and_handshake() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = configured(&dir);
        // Accepts the spawn but never answers the handshake.
        config.tool_server.command = "sh".into();
        config.tool_server.args = vec!["-c".into(), "sleep 1".into()];

        let service = SessionService::with_deadline(
            Arc::new(config),
            Arc::new(SilentReasoner),
            Duration::from_millis(100),
        );
        let err = service
            .run_email_retrieval()
            .await
            .expect_err("handshake never completes");
        assert_eq!(err.kind(), "session_deadline_exceeded");
    }
}
