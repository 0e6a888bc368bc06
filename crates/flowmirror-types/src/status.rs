//! Execution status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Normalized execution status as stored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
    Running,
    Waiting,
    Unknown,
}

impl ExecutionStatus {
    /// Map an upstream status string onto the local vocabulary.
    pub fn from_upstream(status: Option<&str>) -> Self {
        match status.map(str::to_ascii_lowercase).as_deref() {
            Some("success") => Self::Success,
            Some("error") | Some("crashed") | Some("canceled") | Some("cancelled") => Self::Error,
            Some("running") | Some("new") => Self::Running,
            Some("waiting") => Self::Waiting,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the execution reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_upstream(Some(s)))
    }
}
