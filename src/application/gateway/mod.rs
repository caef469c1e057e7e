pub mod error;
pub mod transport;


pub use error::GatewayError;

use crate::config::ToolServerConfig;
use crate::constants::{HANDSHAKE_TIMEOUT, SHUTDOWN_GRACE};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2025-06-18";

/// One capability exposed by the tool server, cached once after the handshake.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// The seam the agent runtime calls tools through.
#[async_trait]
pub trait ToolPort: Send + Sync {
    async fn descriptors(&self) -> Vec<ToolDescriptor>;

    async fn invoke(
        &self,
        tool: &str,
        arguments: Value,
        deadline: Duration,
    ) -> Result<Value, GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatewayState {
    Uninitialized,
    Starting,
    Ready,
    Busy,
    Closing,
    Closed,
    Failed,
}

impl GatewayState {
    fn name(self) -> &'static str {
        match self {
            GatewayState::Uninitialized => "uninitialized",
            GatewayState::Starting => "starting",
            GatewayState::Ready => "ready",
            GatewayState::Busy => "busy",
            GatewayState::Closing => "closing",
            GatewayState::Closed => "closed",
            GatewayState::Failed => "failed",
        }
    }
}

enum PendingFailure {
    Rpc { code: i64, message: String },
    Protocol { message: String },
    ChannelClosed,
}

type PendingSender = oneshot::Sender<Result<Value, PendingFailure>>;

#[derive(Default)]
struct PendingTable {
    in_flight: Option<(String, PendingSender)>,
    // Deadline-expired calls whose reply may still arrive and must be dropped
    // without being treated as a protocol violation.
    abandoned: HashSet<String>,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Owns one external tool server process and its line-oriented request/response
/// channel. Calls are strictly serialized: the stdio pipe gives no pipelining
/// guarantee beyond correlation ids, so a busy/ready gate admits one
/// outstanding call at a time.
pub struct ToolGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    config: ToolServerConfig,
    state: AsyncMutex<GatewayState>,
    child: AsyncMutex<Option<Child>>,
    writer: AsyncMutex<Option<transport::FrameWriter<BoxedWriter>>>,
    pending: StdMutex<PendingTable>,
    next_id: AtomicU64,
    tools: StdMutex<Vec<ToolDescriptor>>,
}

impl ToolGateway {
    pub fn new(config: ToolServerConfig) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                config,
                state: AsyncMutex::new(GatewayState::Uninitialized),
                child: AsyncMutex::new(None),
                writer: AsyncMutex::new(None),
                pending: StdMutex::new(PendingTable::default()),
                next_id: AtomicU64::new(1),
                tools: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Launch the child process, run the initialization exchange, and cache
    /// the tool listing. On success the gateway is `Ready`.
    pub async fn start(&self) -> Result<(), GatewayError> {
        self.inner.enter_starting().await?;

        let config = &self.inner.config;
        let mut command = Command::new(&config.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if !config.args.is_empty() {
            command.args(&config.args);
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.inner.mark_failed().await;
                return Err(GatewayError::Spawn {
                    server: config.name.clone(),
                    source,
                });
            }
        };

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                self.inner.mark_failed().await;
                return Err(self.inner.protocol_error("failed to capture server stdin"));
            }
        };
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                self.inner.mark_failed().await;
                return Err(self.inner.protocol_error("failed to capture server stdout"));
            }
        };

        {
            let mut slot = self.inner.child.lock().await;
            *slot = Some(child);
        }

        self.connect(Box::new(stdin), Box::new(stdout), HANDSHAKE_TIMEOUT)
            .await
    }

    /// Attach an already-open duplex channel and perform the handshake.
    /// `start` goes through here after spawning; tests attach in-memory pipes.
    async fn connect(
        &self,
        writer: BoxedWriter,
        reader: BoxedReader,
        handshake_timeout: Duration,
    ) -> Result<(), GatewayError> {
        {
            let mut slot = self.inner.writer.lock().await;
            *slot = Some(transport::FrameWriter::new(writer));
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.reader_loop(reader).await;
        });

        match timeout(handshake_timeout, self.inner.handshake()).await {
            Ok(Ok(())) => {
                self.inner.enter_ready().await;
                info!(server = %self.inner.config.name, "tool server ready");
                Ok(())
            }
            Ok(Err(err)) => {
                self.inner.mark_failed().await;
                Err(err)
            }
            Err(_) => {
                self.inner.mark_failed().await;
                Err(GatewayError::HandshakeTimeout {
                    server: self.inner.config.name.clone(),
                    timeout: handshake_timeout,
                })
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn start_with_streams(
        &self,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        reader: impl AsyncRead + Send + Unpin + 'static,
        handshake_timeout: Duration,
    ) -> Result<(), GatewayError> {
        self.inner.enter_starting().await?;
        self.connect(Box::new(writer), Box::new(reader), handshake_timeout)
            .await
    }

    #[cfg(test)]
    pub(crate) async fn state_name(&self) -> &'static str {
        self.inner.state.lock().await.name()
    }

    /// Execute one tool call and wait for its correlated response. Rejected
    /// with `NotReady` while another call is outstanding.
    pub async fn invoke(
        &self,
        tool: &str,
        arguments: Value,
        deadline: Duration,
    ) -> Result<Value, GatewayError> {
        {
            let mut state = self.inner.state.lock().await;
            match *state {
                GatewayState::Ready => *state = GatewayState::Busy,
                other => {
                    return Err(GatewayError::NotReady {
                        server: self.inner.config.name.clone(),
                        state: other.name(),
                    });
                }
            }
        }

        let outcome = self.inner.dispatch_call(tool, arguments, deadline).await;

        {
            // A concurrent fault or close takes precedence over Ready.
            let mut state = self.inner.state.lock().await;
            if *state == GatewayState::Busy {
                *state = GatewayState::Ready;
            }
        }

        outcome
    }

    /// Idempotent teardown: close the child's stdin, give it a grace period to
    /// exit, then kill it. Never fails, always ends in `Closed`.
    pub async fn close(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if *state == GatewayState::Closed {
                return;
            }
            *state = GatewayState::Closing;
        }

        {
            let mut writer = self.inner.writer.lock().await;
            if let Some(mut frames) = writer.take() {
                let _ = frames.shutdown().await;
            }
        }

        let child = self.inner.child.lock().await.take();
        if let Some(mut child) = child {
            match timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(status) => {
                    debug!(server = %self.inner.config.name, ?status, "tool server exited");
                }
                Err(_) => {
                    warn!(
                        server = %self.inner.config.name,
                        grace = ?SHUTDOWN_GRACE,
                        "tool server ignored shutdown; killing process"
                    );
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }

        self.inner.release_pending(PendingFailure::ChannelClosed);

        let mut state = self.inner.state.lock().await;
        *state = GatewayState::Closed;
        info!(server = %self.inner.config.name, "gateway closed");
    }
}

#[async_trait]
impl ToolPort for ToolGateway {
    async fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.inner.tools.lock().expect("tool cache lock").clone()
    }

    async fn invoke(
        &self,
        tool: &str,
        arguments: Value,
        deadline: Duration,
    ) -> Result<Value, GatewayError> {
        ToolGateway::invoke(self, tool, arguments, deadline).await
    }
}

impl GatewayInner {
    async fn enter_starting(&self) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        match *state {
            GatewayState::Uninitialized => {
                *state = GatewayState::Starting;
                Ok(())
            }
            other => Err(GatewayError::NotReady {
                server: self.config.name.clone(),
                state: other.name(),
            }),
        }
    }

    async fn enter_ready(&self) {
        let mut state = self.state.lock().await;
        if *state == GatewayState::Starting {
            *state = GatewayState::Ready;
        }
    }

    async fn mark_failed(&self) {
        let mut state = self.state.lock().await;
        if !matches!(*state, GatewayState::Closing | GatewayState::Closed) {
            *state = GatewayState::Failed;
        }
    }

    async fn handshake(&self) -> Result<(), GatewayError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        self.request("initialize", params)
            .await
            .map_err(|failure| self.handshake_failure("initialize", failure))?;

        self.send_frame(&transport::WireFrame::notification(
            "notifications/initialized",
            json!({}),
        ))
        .await?;

        let listing = self
            .request("tools/list", json!({}))
            .await
            .map_err(|failure| self.handshake_failure("tools/list", failure))?;
        self.cache_tools(listing)?;
        Ok(())
    }

    fn handshake_failure(&self, stage: &str, failure: PendingFailure) -> GatewayError {
        match failure {
            PendingFailure::Rpc { code, message } => {
                self.protocol_error(format!("{stage} rejected with code {code}: {message}"))
            }
            PendingFailure::Protocol { message } => self.protocol_error(message),
            PendingFailure::ChannelClosed => {
                self.protocol_error(format!("channel closed during {stage}"))
            }
        }
    }

    fn cache_tools(&self, listing: Value) -> Result<(), GatewayError> {
        let entries = listing
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| self.protocol_error("tools/list result carries no tool array"))?;

        let mut descriptors = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                return Err(self.protocol_error("tool listing entry without a name"));
            };
            descriptors.push(ToolDescriptor {
                name: name.to_string(),
                description: entry
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                input_schema: entry.get("inputSchema").cloned(),
            });
        }

        debug!(server = %self.config.name, tools = descriptors.len(), "tool listing cached");
        let mut cache = self.tools.lock().expect("tool cache lock");
        *cache = descriptors;
        Ok(())
    }

    async fn dispatch_call(
        &self,
        tool: &str,
        arguments: Value,
        deadline: Duration,
    ) -> Result<Value, GatewayError> {
        let descriptor = {
            let cache = self.tools.lock().expect("tool cache lock");
            cache.iter().find(|entry| entry.name == tool).cloned()
        };
        let Some(descriptor) = descriptor else {
            return Err(GatewayError::UnknownTool {
                server: self.config.name.clone(),
                tool: tool.to_string(),
            });
        };

        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        if let Err(message) = validate_arguments(&descriptor, &arguments) {
            return Err(GatewayError::InvalidArguments {
                tool: tool.to_string(),
                message,
            });
        }

        let params = json!({ "name": tool, "arguments": arguments });
        let (id, receiver) = self.register_call()?;
        debug!(server = %self.config.name, tool, correlation = %id, "dispatching tool call");
        self.send_frame(&transport::WireFrame::request(
            id.clone(),
            "tools/call",
            params,
        ))
        .await?;

        match timeout(deadline, receiver).await {
            Err(_) => {
                self.abandon_call(&id);
                Err(GatewayError::ToolTimeout {
                    server: self.config.name.clone(),
                    tool: tool.to_string(),
                    timeout: deadline,
                })
            }
            Ok(Err(_)) => Err(self.protocol_error("response channel dropped")),
            Ok(Ok(Err(PendingFailure::Rpc { code, message }))) => Err(GatewayError::Tool {
                server: self.config.name.clone(),
                tool: tool.to_string(),
                message: format!("{message} (code {code})"),
            }),
            Ok(Ok(Err(PendingFailure::Protocol { message }))) => Err(self.protocol_error(message)),
            Ok(Ok(Err(PendingFailure::ChannelClosed))) => {
                Err(self.protocol_error("tool server channel closed mid-call"))
            }
            Ok(Ok(Ok(result))) => {
                let failed = result
                    .get("isError")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if failed {
                    Err(GatewayError::Tool {
                        server: self.config.name.clone(),
                        tool: tool.to_string(),
                        message: extract_tool_message(&result)
                            .unwrap_or_else(|| "tool reported an unspecified error".to_string()),
                    })
                } else {
                    Ok(result)
                }
            }
        }
    }

    /// Request/response over the channel with no deadline of its own; callers
    /// wrap the await in whatever timeout their operation carries.
    async fn request(&self, method: &str, params: Value) -> Result<Value, PendingFailure> {
        let (id, receiver) = self.register_call().map_err(|err| PendingFailure::Protocol {
            message: err.to_string(),
        })?;
        self.send_frame(&transport::WireFrame::request(id, method, params))
            .await
            .map_err(|err| PendingFailure::Protocol {
                message: err.to_string(),
            })?;
        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(PendingFailure::ChannelClosed),
        }
    }

    fn register_call(
        &self,
    ) -> Result<(String, oneshot::Receiver<Result<Value, PendingFailure>>), GatewayError> {
        let id = format!("call-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = oneshot::channel();
        let mut pending = self.pending.lock().expect("pending table lock");
        if pending.in_flight.is_some() {
            return Err(self.protocol_error("attempted to overlap correlated calls"));
        }
        pending.in_flight = Some((id.clone(), sender));
        Ok((id, receiver))
    }

    fn abandon_call(&self, id: &str) {
        let mut pending = self.pending.lock().expect("pending table lock");
        if pending
            .in_flight
            .as_ref()
            .is_some_and(|(in_flight, _)| in_flight == id)
        {
            pending.in_flight = None;
            pending.abandoned.insert(id.to_string());
        }
    }

    fn release_pending(&self, failure: PendingFailure) {
        let mut pending = self.pending.lock().expect("pending table lock");
        if let Some((_, sender)) = pending.in_flight.take() {
            let _ = sender.send(Err(failure));
        }
        pending.abandoned.clear();
    }

    async fn send_frame(&self, frame: &transport::WireFrame) -> Result<(), GatewayError> {
        let mut writer = self.writer.lock().await;
        let frames = writer
            .as_mut()
            .ok_or_else(|| self.protocol_error("transport channel not attached"))?;
        frames
            .send(frame)
            .await
            .map_err(|err| self.protocol_error(format!("failed to write frame: {err}")))
    }

    async fn reader_loop(self: Arc<Self>, reader: BoxedReader) {
        let mut frames = transport::FrameReader::new(reader);
        loop {
            match frames.next().await {
                Ok(Some(transport::Inbound::Frame(frame))) => {
                    if !self.route_frame(frame).await {
                        return;
                    }
                }
                Ok(Some(transport::Inbound::Malformed { line, source })) => {
                    self.fault(format!("unparseable frame {line:?}: {source}"))
                        .await;
                    return;
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(server = %self.config.name, %err, "transport read error");
                    break;
                }
            }
        }
        self.channel_closed().await;
    }

    /// Returns false once the channel is considered poisoned.
    async fn route_frame(&self, frame: transport::WireFrame) -> bool {
        if frame.is_peer_initiated() {
            let method = frame.method.as_deref().unwrap_or_default().to_string();
            self.fault(format!(
                "unsolicited '{method}' message outside a pending call"
            ))
            .await;
            return false;
        }

        let key = match frame.id.as_ref().and_then(correlation_key) {
            Some(key) => key,
            None => {
                self.fault("response frame without a correlation id".to_string())
                    .await;
                return false;
            }
        };

        let delivery = {
            let mut pending = self.pending.lock().expect("pending table lock");
            if pending
                .in_flight
                .as_ref()
                .is_some_and(|(id, _)| *id == key)
            {
                let (_, sender) = pending.in_flight.take().expect("matched in-flight call");
                Some(sender)
            } else if pending.abandoned.remove(&key) {
                debug!(
                    server = %self.config.name,
                    correlation = %key,
                    "discarding response for abandoned call"
                );
                return true;
            } else {
                None
            }
        };

        match delivery {
            Some(sender) => {
                let outcome = match frame.error {
                    Some(error) => Err(PendingFailure::Rpc {
                        code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                        message: error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string(),
                    }),
                    None => Ok(frame.result.unwrap_or(Value::Null)),
                };
                let _ = sender.send(outcome);
                true
            }
            None => {
                self.fault(format!("response with unknown correlation id '{key}'"))
                    .await;
                false
            }
        }
    }

    async fn fault(&self, message: String) {
        warn!(server = %self.config.name, message = %message, "protocol violation");
        self.release_pending(PendingFailure::Protocol { message });
        self.mark_failed().await;
    }

    async fn channel_closed(&self) {
        self.release_pending(PendingFailure::ChannelClosed);
        self.mark_failed().await;
    }

    fn protocol_error(&self, message: impl Into<String>) -> GatewayError {
        GatewayError::Protocol {
            server: self.config.name.clone(),
            message: message.into(),
        }
    }
}

fn correlation_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Shallow structural check of tool arguments against the descriptor's input
/// schema: required keys must be present and declared top-level types must
/// match. Anything deeper is the tool server's own business.
fn validate_arguments(descriptor: &ToolDescriptor, arguments: &Value) -> Result<(), String> {
    let Some(object) = arguments.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };
    let Some(schema) = &descriptor.input_schema else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(format!("missing required field '{key}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in object {
            let Some(expected) = properties
                .get(key)
                .and_then(|property| property.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !json_type_matches(expected, value) {
                return Err(format!("field '{key}' should be of type {expected}"));
            }
        }
    }

    Ok(())
}

fn json_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn extract_tool_message(result: &Value) -> Option<String> {
    if let Some(blocks) = result.get("content").and_then(Value::as_array) {
        for block in blocks {
            let is_text = block
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|kind| kind.eq_ignore_ascii_case("text"));
            if is_text {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
        }
    }
    None
}
