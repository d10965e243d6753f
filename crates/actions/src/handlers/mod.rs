//! Built-in handlers, one per [`ActionType`](crate::ActionType).

mod condition;
mod email;
mod notification;
mod task;
mod wait;
mod webhook;

pub use condition::{ConditionHandler, Operator};
pub use email::EmailHandler;
pub use notification::NotificationHandler;
pub use task::TaskHandler;
pub use wait::{WaitHandler, WaitUnit};
pub use webhook::WebhookHandler;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::{ActionError, ActionType};

/// Deserialize a handler's typed config, mapping failures to `ActionError::Config`.
pub(crate) fn parse_config<T: DeserializeOwned>(
    action_type: ActionType,
    config: &Value,
) -> Result<T, ActionError> {
    serde_json::from_value(config.clone())
        .map_err(|e| ActionError::config(action_type, e.to_string()))
}

pub(crate) fn require_non_empty(
    action_type: ActionType,
    field: &str,
    value: &str,
) -> Result<(), ActionError> {
    if value.trim().is_empty() {
        return Err(ActionError::config(action_type, format!("'{field}' must not be empty")));
    }
    Ok(())
}

/// A config field that may be given as one string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub(crate) fn into_vec(self) -> Vec<String> {
        let items = match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        };
        items
            .into_iter()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
