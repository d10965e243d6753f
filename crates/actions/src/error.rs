//! Action-level error type.

use thiserror::Error;

use crate::ActionType;

/// Errors returned by a handler's `execute` method.
///
/// The `Display` output is the exact message the engine records on the run,
/// so variants format their reason without any extra prefix.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    /// Missing or malformed configuration, raised before any side effect.
    #[error("invalid {action_type} config: {message}")]
    Config {
        action_type: ActionType,
        message: String,
    },

    /// The underlying operation failed.
    #[error("{0}")]
    Execution(String),

    /// A condition action evaluated to false.
    #[error("condition not met")]
    ConditionNotMet,

    /// Nothing is registered for this action type.
    #[error("no handler registered for action type '{0}'")]
    Unsupported(ActionType),
}

impl ActionError {
    pub fn config(action_type: ActionType, message: impl Into<String>) -> Self {
        Self::Config {
            action_type,
            message: message.into(),
        }
    }

    /// True for errors raised before the handler attempted its side effect.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Unsupported(_))
    }
}
