use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that end a turn without a reply
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurnError {
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("Unknown tool requested: {0}")]
    UnknownTool(String),

    #[error("Malformed tool arguments: {0}")]
    MalformedToolArguments(String),

    #[error("Tool failed: {0}")]
    ToolFailed(String),

    #[error("Prompt rendering failed: {0}")]
    Prompt(String),

    #[error("User message must not be empty")]
    EmptyMessage,
}

impl TurnError {
    pub(crate) fn collaborator(err: anyhow::Error) -> Self {
        TurnError::CollaboratorUnavailable(format!("{:#}", err))
    }
}

impl From<AgentError> for TurnError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::ToolNotFound(name) => TurnError::UnknownTool(name),
            AgentError::InvalidParameters(msg) => TurnError::MalformedToolArguments(msg),
            AgentError::ExecutionError(msg) | AgentError::Internal(msg) => {
                TurnError::ToolFailed(msg)
            }
        }
    }
}
