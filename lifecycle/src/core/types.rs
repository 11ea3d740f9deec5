//! Shared value types passed across hook boundaries.
//!
//! These types are the stable contract between the run controller and whatever
//! orchestration layer installs hooks. They carry no behavior beyond
//! construction helpers and must stay cheap to clone.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open, string-keyed mapping attached to states, contexts and results.
pub type Metadata = BTreeMap<String, Value>;

/// Named arguments handed to a step body.
pub type StepInputs = BTreeMap<String, Value>;

/// Immutable view of the run handed to every hook.
///
/// Rebuilt before each hook call; holding one never blocks the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Stable identifier of the persistent agent entity.
    pub agent_id: String,
    /// Identifier of the current run.
    pub session_id: String,
    /// Step in progress, or empty before the first step.
    pub current_step: String,
    pub metadata: Metadata,
}

/// Input to the start-of-step hook and to the step body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    pub step_name: String,
    pub inputs: StepInputs,
    pub metadata: Metadata,
}

impl StepContext {
    pub fn new(step_name: impl Into<String>, inputs: StepInputs) -> Self {
        Self {
            step_name: step_name.into(),
            inputs,
            metadata: Metadata::new(),
        }
    }

    /// Look up a named input.
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }
}

/// Structured cause of a failed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    /// Top-level error message.
    pub message: String,
    /// Messages of every underlying cause, outermost first.
    pub causes: Vec<String>,
}

impl StepError {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for cause in &self.causes {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Input to the end-of-step hook.
///
/// Exactly one of `output` / `error` is populated; use [`StepResult::succeeded`]
/// and [`StepResult::failed`] to keep that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub output: Option<Value>,
    pub success: bool,
    pub error: Option<StepError>,
    pub duration: Duration,
    pub metadata: Metadata,
}

impl StepResult {
    pub fn succeeded(step_name: impl Into<String>, output: Value, duration: Duration) -> Self {
        Self {
            step_name: step_name.into(),
            output: Some(output),
            success: true,
            error: None,
            duration,
            metadata: Metadata::new(),
        }
    }

    pub fn failed(step_name: impl Into<String>, error: StepError, duration: Duration) -> Self {
        Self {
            step_name: step_name.into(),
            output: None,
            success: false,
            error: Some(error),
            duration,
            metadata: Metadata::new(),
        }
    }
}

/// Control decision produced by the interrupt hook.
///
/// The run controller relays the decision; acting on it is up to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptDecision {
    Pause,
    Continue,
    Abort,
}

impl InterruptDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            InterruptDecision::Pause => "pause",
            InterruptDecision::Continue => "continue",
            InterruptDecision::Abort => "abort",
        }
    }

    /// Canonical reply value for an interrupt hook.
    pub fn reply(self) -> Value {
        Value::String(self.as_str().to_string())
    }

    /// Parse the raw value returned by an interrupt hook.
    ///
    /// Only the exact lowercase decision names are accepted; anything else,
    /// including other spellings of a valid name, is `None`.
    pub fn from_reply(value: &Value) -> Option<Self> {
        value.as_str().and_then(|raw| raw.parse().ok())
    }

    /// Whether the agent should stop at its next step boundary.
    pub fn stops_run(self) -> bool {
        !matches!(self, InterruptDecision::Continue)
    }
}

impl FromStr for InterruptDecision {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pause" => Ok(InterruptDecision::Pause),
            "continue" => Ok(InterruptDecision::Continue),
            "abort" => Ok(InterruptDecision::Abort),
            _ => Err(()),
        }
    }
}

impl fmt::Display for InterruptDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};
    use serde_json::json;

    #[test]
    fn decision_reply_requires_canonical_spelling() {
        assert_eq!(
            InterruptDecision::from_reply(&json!("pause")),
            Some(InterruptDecision::Pause)
        );
        assert_eq!(InterruptDecision::from_reply(&json!("PAUSE")), None);
        assert_eq!(InterruptDecision::from_reply(&json!("Continue")), None);
        assert_eq!(InterruptDecision::from_reply(&json!(" abort")), None);
        assert_eq!(
            InterruptDecision::from_reply(&InterruptDecision::Abort.reply()),
            Some(InterruptDecision::Abort)
        );
        assert_eq!(InterruptDecision::from_reply(&json!("stop")), None);
        assert_eq!(InterruptDecision::from_reply(&json!(1)), None);
        assert_eq!(InterruptDecision::from_reply(&Value::Null), None);
    }

    #[test]
    fn only_continue_keeps_the_run_going() {
        assert!(InterruptDecision::Pause.stops_run());
        assert!(InterruptDecision::Abort.stops_run());
        assert!(!InterruptDecision::Continue.stops_run());
    }

    #[test]
    fn step_error_keeps_the_cause_chain() {
        let err = Err::<(), _>(anyhow!("socket closed"))
            .context("fetch context")
            .unwrap_err();
        let step_err = StepError::from_anyhow(&err);
        assert_eq!(step_err.message, "fetch context");
        assert_eq!(step_err.causes, vec!["socket closed".to_string()]);
        assert_eq!(step_err.to_string(), "fetch context: socket closed");
    }

    #[test]
    fn step_result_constructors_populate_exactly_one_side() {
        let ok = StepResult::succeeded("plan", json!({"steps": 3}), Duration::ZERO);
        assert!(ok.success && ok.output.is_some() && ok.error.is_none());

        let failed = StepResult::failed(
            "plan",
            StepError {
                message: "boom".to_string(),
                causes: Vec::new(),
            },
            Duration::from_millis(5),
        );
        assert!(!failed.success && failed.output.is_none() && failed.error.is_some());
    }
}
