use serenity::all::Permissions;
use thiserror::Error;

use crate::antinuke::ActionKind;

/// Rejected operator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("antinuke.time_window_ms must be greater than zero")]
    ZeroTimeWindow,
    #[error("antinuke.{0} must be greater than zero")]
    ZeroThreshold(&'static str),
    #[error("antinuke.emergency_duration_ms must be greater than zero")]
    ZeroEmergencyDuration,
}

/// Failures the engine catches, logs and reports, but never propagates to the
/// event loop. A disabled policy or a whitelisted actor is not an error; those
/// are `Verdict::Disabled` / `Verdict::Exempt`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AntinukeError {
    /// An external call (ban, kick, role edit, channel edit, invite delete, notify) failed.
    #[error("{op} failed for {target}: {reason}")]
    ActuatorFailure {
        op: &'static str,
        target: String,
        reason: String,
    },

    /// The responsible actor for an event could not be identified.
    #[error("could not attribute {kind} event: {reason}")]
    ResolutionFailure { kind: ActionKind, reason: String },

    #[error("bot lacks {missing:?} required to {op}")]
    MissingAuthority {
        op: &'static str,
        missing: Permissions,
    },
}

impl AntinukeError {
    pub fn actuator(op: &'static str, target: impl ToString, err: &anyhow::Error) -> Self {
        Self::ActuatorFailure {
            op,
            target: target.to_string(),
            reason: format!("{err:#}"),
        }
    }

    pub fn resolution(kind: ActionKind, reason: impl Into<String>) -> Self {
        Self::ResolutionFailure {
            kind,
            reason: reason.into(),
        }
    }
}
