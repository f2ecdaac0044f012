//! Host-visible status codes and the orchestrator lifecycle

use std::fmt;

/// Status value reported after a successful initialization or clean shutdown
pub const STATUS_SUCCESS: i32 = 0;

/// Status value reported when initialization failed
pub const STATUS_INIT_FAILED: i32 = 0x0001_0001;

/// Status value before the first initialization
pub const STATUS_NOT_STARTED: i32 = 0x0001_0002;

/// Return value of a shutdown that hit an error
pub const SHUTDOWN_FAILED: i32 = -1;

/// Decoded form of the raw status value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Running, or cleanly shut down
    Success,
    /// The session could not be brought up
    InitFailed,
    /// Never initialized
    NotStarted,
    /// A value this crate does not produce
    Unknown(i32),
}

impl StatusCode {
    /// Raw value as exposed to hosts
    pub fn code(self) -> i32 {
        match self {
            Self::Success => STATUS_SUCCESS,
            Self::InitFailed => STATUS_INIT_FAILED,
            Self::NotStarted => STATUS_NOT_STARTED,
            Self::Unknown(code) => code,
        }
    }

    /// Decode a raw value
    pub fn from_code(code: i32) -> Self {
        match code {
            STATUS_SUCCESS => Self::Success,
            STATUS_INIT_FAILED => Self::InitFailed,
            STATUS_NOT_STARTED => Self::NotStarted,
            other => Self::Unknown(other),
        }
    }

    /// Human readable status for host status panes
    pub fn describe(self) -> String {
        match self {
            Self::Success => "Success! (Code 0)\nI_OK\n\nEverything's good!".to_string(),
            Self::InitFailed => format!(
                "Initialization failure! (Code {STATUS_INIT_FAILED})\nE_INIT_FAILED\n\n\
                 The VR runtime, session or graphics device could not be set up."
            ),
            Self::NotStarted => format!(
                "Not started! (Code {STATUS_NOT_STARTED})\nE_NOT_STARTED\n\n\
                 The tracking handler has not been initialized yet."
            ),
            Self::Unknown(code) => format!(
                "Undefined: {code}\nE_UNDEFINED\nSomething weird has happened, though we can't tell what."
            ),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::InitFailed => write!(f, "InitFailed"),
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Unknown(code) => write!(f, "Unknown({code:#x})"),
        }
    }
}

/// Where the orchestrator is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Before the first initialization, or after shutdown
    NotStarted,
    /// Inside `initialize`
    Initializing,
    /// Session up, updates do work
    Running,
    /// Initialization failed, updates are no-ops
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_decoding() {
        assert_eq!(StatusCode::from_code(0), StatusCode::Success);
        assert_eq!(StatusCode::from_code(0x00010001), StatusCode::InitFailed);
        assert_eq!(StatusCode::from_code(0x00010002), StatusCode::NotStarted);
        assert_eq!(StatusCode::from_code(-1), StatusCode::Unknown(-1));
        assert_eq!(StatusCode::InitFailed.code(), 65537);
    }

    #[test]
    fn test_descriptions() {
        assert!(StatusCode::Success.describe().contains("I_OK"));
        assert!(StatusCode::InitFailed.describe().contains("E_INIT_FAILED"));
        assert!(StatusCode::Unknown(42).describe().starts_with("Undefined: 42"));
    }
}
