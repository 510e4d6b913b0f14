//! Error kinds surfaced by the gateway, the poller and configuration loading.
//!
//! Counter resets, reboots and sample gaps are *not* errors: they are reported
//! as [`crate::stitch::Discontinuity`] values and the `counter_reset` flag on
//! [`crate::window::SampleWindow`].

use std::fmt;

use thiserror::Error;

/// Remote operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetStatus,
    GetHistory,
    GetLocation,
    GetObstructionMap,
    Reboot,
    Stow,
    SetSleepConfig,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetStatus => write!(f, "get_status"),
            Self::GetHistory => write!(f, "get_history"),
            Self::GetLocation => write!(f, "get_location"),
            Self::GetObstructionMap => write!(f, "get_obstruction_map"),
            Self::Reboot => write!(f, "reboot"),
            Self::Stow => write!(f, "stow"),
            Self::SetSleepConfig => write!(f, "set_sleep_config"),
        }
    }
}

/// Everything that can go wrong talking to the dish or preparing a poll.
#[derive(Debug, Error)]
pub enum DishError {
    /// The dish answered with an explicit error.
    #[error("{op}: {message}")]
    CallRejected { op: Operation, message: String },

    /// Connection or timeout failure with no further detail.
    #[error("{op}: Unknown communication or service error")]
    Communication { op: Operation },

    /// The reply did not have the expected shape.
    #[error("{op}: Protocol error ({detail})")]
    Protocol { op: Operation, detail: String },

    /// An aggregation cycle completed without a single history snapshot.
    #[error("no history data obtained during this aggregation cycle")]
    NoHistory,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DishError {
    pub(crate) fn protocol(op: Operation, detail: impl Into<String>) -> Self {
        Self::Protocol {
            op,
            detail: detail.into(),
        }
    }

    /// True for failures that originate from the transport or the reply shape,
    /// i.e. the ones a poll loop absorbs and retries at the next interval.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::CallRejected { .. } | Self::Communication { .. } | Self::Protocol { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DishError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_operation() {
        let e = DishError::Communication {
            op: Operation::GetHistory,
        };
        assert_eq!(
            e.to_string(),
            "get_history: Unknown communication or service error"
        );

        let e = DishError::CallRejected {
            op: Operation::Reboot,
            message: "not allowed".into(),
        };
        assert_eq!(e.to_string(), "reboot: not allowed");

        let e = DishError::protocol(Operation::GetLocation, "missing lla");
        assert_eq!(e.to_string(), "get_location: Protocol error (missing lla)");
    }

    #[test]
    fn remote_classification() {
        assert!(
            DishError::Communication {
                op: Operation::GetStatus
            }
            .is_remote()
        );
        assert!(!DishError::NoHistory.is_remote());
        assert!(!DishError::Config("x".into()).is_remote());
    }
}
