mod directive;
mod errors;
mod reasoner;


pub use directive::{AgentDirective, extract_json, parse_directive};
pub use errors::AgentError;
pub use reasoner::{ChatMessage, MessageRole, Reasoner, ReasonerError};

use crate::application::gateway::{ToolDescriptor, ToolPort};
use crate::constants::{EXPECTED_EMAIL_COUNT, MAX_AGENT_TURNS, TOOL_CALL_TIMEOUT};
use crate::domain::types::MailboxReport;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub max_turns: usize,
    pub tool_deadline: Duration,
    pub expected_emails: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_turns: MAX_AGENT_TURNS,
            tool_deadline: TOOL_CALL_TIMEOUT,
            expected_emails: EXPECTED_EMAIL_COUNT,
        }
    }
}

/// Bounded reasoning-and-tool-call loop. Each turn asks the reasoner for the
/// next action, executes requested tool calls through the gateway port, feeds
/// results (and recoverable failures) back into the transcript, and validates
/// the final answer against the mailbox output contract.
pub struct AgentRuntime {
    reasoner: Arc<dyn Reasoner>,
    tools: Arc<dyn ToolPort>,
    options: AgentOptions,
}

impl AgentRuntime {
    pub fn new(reasoner: Arc<dyn Reasoner>, tools: Arc<dyn ToolPort>) -> Self {
        Self::with_options(reasoner, tools, AgentOptions::default())
    }

    pub fn with_options(
        reasoner: Arc<dyn Reasoner>,
        tools: Arc<dyn ToolPort>,
        options: AgentOptions,
    ) -> Self {
        Self {
            reasoner,
            tools,
            options,
        }
    }

    pub async fn run(&self, task: &str) -> Result<MailboxReport, AgentError> {
        let descriptors = self.tools.descriptors().await;
        info!(tools = descriptors.len(), "agent run started");

        let mut messages = vec![
            ChatMessage::system(compose_system_instructions(&descriptors)),
            ChatMessage::user(task),
        ];

        for turn in 1..=self.options.max_turns {
            debug!(turn, "submitting agent turn to reasoner");
            let content = self.reasoner.next_action(&messages).await?;
            messages.push(ChatMessage::assistant(content.clone()));

            match parse_directive(&content) {
                AgentDirective::CallTool { tool, arguments } => {
                    info!(turn, tool = %tool, "agent requested tool call");
                    match self
                        .tools
                        .invoke(&tool, arguments.clone(), self.options.tool_deadline)
                        .await
                    {
                        Ok(output) => {
                            messages.push(ChatMessage::user(tool_feedback(
                                &tool, true, output,
                            )));
                        }
                        Err(err) if err.is_recoverable() => {
                            warn!(turn, tool = %tool, %err, "tool call failed; agent may retry");
                            messages.push(ChatMessage::user(tool_feedback(
                                &tool,
                                false,
                                json!({ "error": err.to_string() }),
                            )));
                        }
                        Err(err) => return Err(AgentError::Gateway(err)),
                    }
                }
                AgentDirective::Final { payload } => {
                    info!(turn, "agent produced a final answer");
                    let report =
                        MailboxReport::parse(payload, self.options.expected_emails)?;
                    return Ok(report);
                }
            }
        }

        warn!(budget = self.options.max_turns, "agent exhausted its turn budget");
        Err(AgentError::TurnBudgetExceeded {
            budget: self.options.max_turns,
        })
    }
}

fn compose_system_instructions(descriptors: &[ToolDescriptor]) -> String {
    let mut lines = vec![
        "You are a helpful assistant that interacts with Gmail. Use the provided tools to help the user manage their Gmail account.".to_string(),
        "All responses must be valid JSON without commentary or code fences.".to_string(),
        "When you need to invoke a tool, respond with: {\"action\":\"call_tool\",\"tool\":\"tool_name\",\"input\":{...}}.".to_string(),
        "When you are ready to give the final answer, respond with: {\"action\":\"final\",\"response\":\"...\"}.".to_string(),
    ];

    if descriptors.is_empty() {
        lines.push("No tools are currently available.".to_string());
        return lines.join(" ");
    }

    lines.push("Available tools:".to_string());
    for descriptor in descriptors {
        let mut line = format!("- {}", descriptor.name);
        if let Some(description) = &descriptor.description {
            line.push_str(&format!(": {}", description));
        }
        if let Some(schema) = &descriptor.input_schema {
            let compact = serde_json::to_string(schema).unwrap_or_default();
            line.push_str(&format!(". Input schema: {}", compact));
        }
        lines.push(line);
    }

    lines.join(" ")
}

fn tool_feedback(tool: &str, success: bool, output: Value) -> String {
    json!({
        "tool_result": {
            "tool": tool,
            "success": success,
            "output": output,
        }
    })
    .to_string()
}
