use super::reasoner::ReasonerError;
use crate::application::gateway::GatewayError;
use crate::domain::types::ContractViolation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Reasoner(#[from] ReasonerError),
    /// Non-recoverable gateway failure; recoverable ones are fed back into
    /// the transcript instead of surfacing here.
    #[error(transparent)]
    Gateway(GatewayError),
    #[error("agent exhausted its {budget}-turn budget without a final answer")]
    TurnBudgetExceeded { budget: usize },
    #[error("final answer violates the output contract: {0}")]
    OutputContract(#[from] ContractViolation),
}
