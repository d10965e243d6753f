//! The closed set of action types a pipeline step can have.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Notification,
    Email,
    Task,
    Webhook,
    Condition,
    Wait,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        Self::Notification,
        Self::Email,
        Self::Task,
        Self::Webhook,
        Self::Condition,
        Self::Wait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Email => "email",
            Self::Task => "task",
            Self::Webhook => "webhook",
            Self::Condition => "condition",
            Self::Wait => "wait",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown action type: {s}"))
    }
}
