use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::parse_config;
use crate::{ActionError, ActionHandler, ActionType, RunContext};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUnit {
    #[default]
    #[serde(alias = "second")]
    Seconds,
    #[serde(alias = "minute")]
    Minutes,
    #[serde(alias = "hour")]
    Hours,
}

impl WaitUnit {
    fn millis(self) -> f64 {
        match self {
            Self::Seconds => 1_000.0,
            Self::Minutes => 60_000.0,
            Self::Hours => 3_600_000.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WaitConfig {
    duration: f64,
    #[serde(default)]
    unit: WaitUnit,
}

/// Suspends the pipeline for the configured duration.
pub struct WaitHandler;

impl WaitHandler {
    /// Convert a wait config into milliseconds without sleeping.
    pub fn duration_ms(config: &Value) -> Result<u64, ActionError> {
        let cfg: WaitConfig = parse_config(ActionType::Wait, config)?;
        if !cfg.duration.is_finite() || cfg.duration < 0.0 {
            return Err(ActionError::config(
                ActionType::Wait,
                "'duration' must be a non-negative number",
            ));
        }
        Ok((cfg.duration * cfg.unit.millis()).round() as u64)
    }
}

#[async_trait]
impl ActionHandler for WaitHandler {
    fn action_type(&self) -> ActionType {
        ActionType::Wait
    }

    async fn execute(&self, config: &Value, _ctx: &RunContext) -> Result<Value, ActionError> {
        let ms = Self::duration_ms(config)?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "duration_ms": ms }))
    }
}
