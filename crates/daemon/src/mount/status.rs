//! Mount lifecycle states

use serde::{Deserialize, Serialize};

/// Where the kernel session is in its lifecycle
///
/// `Unattached -> Attaching -> Attached -> Detaching -> Unattached`. A failed
/// attach goes straight back to `Unattached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountStatus {
    Unattached,
    Attaching,
    Attached,
    Detaching,
}

impl MountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountStatus::Unattached => "unattached",
            MountStatus::Attaching => "attaching",
            MountStatus::Attached => "attached",
            MountStatus::Detaching => "detaching",
        }
    }

    /// Attaching and detaching are transitions; lifecycle calls fail fast with `Busy`
    pub fn is_transitioning(&self) -> bool {
        matches!(self, MountStatus::Attaching | MountStatus::Detaching)
    }
}

impl std::str::FromStr for MountStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "unattached" => MountStatus::Unattached,
            "attaching" => MountStatus::Attaching,
            "attached" => MountStatus::Attached,
            "detaching" => MountStatus::Detaching,
            _ => MountStatus::Unattached,
        })
    }
}

impl std::fmt::Display for MountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
