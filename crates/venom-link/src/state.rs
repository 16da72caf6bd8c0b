//! System-state frames published by the neural core.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Activity tag reported by the backend.
///
/// The set is open: tags this client does not know are kept verbatim in
/// [`SystemStatus::Other`] rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SystemStatus {
    Booting,
    Listening,
    Thinking,
    Processing,
    Error,
    Offline,
    Other(String),
}

impl SystemStatus {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Booting => "BOOTING",
            Self::Listening => "LISTENING",
            Self::Thinking => "THINKING",
            Self::Processing => "PROCESSING",
            Self::Error => "ERROR",
            Self::Offline => "OFFLINE",
            Self::Other(tag) => tag.as_str(),
        }
    }

    /// Whether the tag is one of the documented activity states.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for SystemStatus {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "BOOTING" => Self::Booting,
            "LISTENING" => Self::Listening,
            "THINKING" => Self::Thinking,
            "PROCESSING" => Self::Processing,
            "ERROR" => Self::Error,
            "OFFLINE" => Self::Offline,
            _ => Self::Other(tag),
        }
    }
}

impl From<SystemStatus> for String {
    fn from(status: SystemStatus) -> Self {
        match status {
            SystemStatus::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource gauges. The backend bounds them; the client only rejects values
/// that are negative or not finite.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub ram_percent: f64,
    #[serde(default)]
    pub neural_activity: f64,
}

impl Vitals {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("cpu_percent", self.cpu_percent),
            ("ram_percent", self.ram_percent),
            ("neural_activity", self.neural_activity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ClientError::Protocol(format!(
                    "invalid vitals.{name}: {value}"
                )));
            }
        }
        Ok(())
    }
}

/// One decoded frame from the system stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub status: SystemStatus,
    #[serde(default)]
    pub detail: String,
    pub vitals: Vitals,
}

impl SystemState {
    /// State shown before the first frame arrives.
    #[must_use]
    pub fn booting() -> Self {
        Self {
            status: SystemStatus::Booting,
            detail: "Initializing Symbiotic Link...".to_string(),
            vitals: Vitals::default(),
        }
    }
}

/// Decode one inbound text frame.
pub fn decode_frame(text: &str) -> Result<SystemState> {
    let state: SystemState = serde_json::from_str(text)?;
    state.vitals.validate()?;
    Ok(state)
}
