use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::slug::slugify;

/// Status of a service check, following the nagios plugin exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ReturnCode {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl ReturnCode {
    /// Map a probe exit code onto a return code, anything unexpected is Unknown
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ReturnCode::Ok,
            Some(1) => ReturnCode::Warning,
            Some(2) => ReturnCode::Critical,
            _ => ReturnCode::Unknown,
        }
    }

    pub fn is_problem(self) -> bool {
        matches!(self, ReturnCode::Warning | ReturnCode::Critical)
    }
}

impl From<ReturnCode> for u8 {
    fn from(code: ReturnCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReturnCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReturnCode::Ok),
            1 => Ok(ReturnCode::Warning),
            2 => Ok(ReturnCode::Critical),
            3 => Ok(ReturnCode::Unknown),
            other => Err(format!("invalid return code: {other}")),
        }
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnCode::Ok => write!(f, "OK"),
            ReturnCode::Warning => write!(f, "Warning"),
            ReturnCode::Critical => write!(f, "Critical"),
            ReturnCode::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Whether a service status has been confirmed or is still inside its retry window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceState {
    Confirmed,
    Unconfirmed,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Confirmed => write!(f, "CONFIRMED"),
            ServiceState::Unconfirmed => write!(f, "UNCONFIRMED"),
        }
    }
}

/// A single performance metric parsed from probe output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    pub label: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Result of one service check on one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCheckResult {
    /// `{device_id}-{slug(name)}`
    pub id: String,

    pub name: String,

    pub return_code: ReturnCode,

    /// Display text, after the output filter ran
    pub text: String,

    /// Unfiltered probe output
    pub raw_text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub perf_data: Vec<Metric>,

    pub state: ServiceState,

    pub check_attempt: u32,

    pub last_state_change: DateTime<Utc>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifier: Option<String>,

    /// Id of the owning device
    pub host: String,
}

impl ServiceCheckResult {
    /// Create a new confirmed result, the state machine adjusts it afterwards
    pub fn new(host_id: &str, name: &str, return_code: ReturnCode, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: service_id(host_id, name),
            name: name.to_string(),
            return_code,
            raw_text: text.clone(),
            text,
            perf_data: Vec::new(),
            state: ServiceState::Confirmed,
            check_attempt: 1,
            last_state_change: Utc::now(),
            tags: Vec::new(),
            service_url: None,
            notifier: None,
            host: host_id.to_string(),
        }
    }

    /// Result for a service that was skipped because the host is unreachable
    pub fn not_attempted(host_id: &str, name: &str) -> Self {
        Self::new(host_id, name, ReturnCode::Unknown, "Not attempted")
    }

    pub fn with_raw_text(mut self, raw_text: impl Into<String>) -> Self {
        self.raw_text = raw_text.into();
        self
    }

    pub fn with_perf_data(mut self, perf_data: Vec<Metric>) -> Self {
        self.perf_data = perf_data;
        self
    }
}

/// Build the id of a service on a device
pub fn service_id(host_id: &str, name: &str) -> String {
    format!("{}-{}", host_id, slugify(name))
}

/// Snapshot of a device after a check cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCheckResult {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(rename = "type")]
    pub type_id: String,
    pub icon: String,
    pub info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_page: Option<String>,
    /// Check interval in minutes
    pub interval: u64,
    #[serde(default)]
    pub silenced_until: Option<DateTime<Utc>>,
    pub services: Vec<ServiceCheckResult>,
    pub overall_status: ReturnCode,
    /// Return code of the Alive service
    pub alive: ReturnCode,
    pub last_check: DateTime<Utc>,
    pub next_check: DateTime<Utc>,
}

impl HostCheckResult {
    pub fn service(&self, service_id: &str) -> Option<&ServiceCheckResult> {
        self.services.iter().find(|s| s.id == service_id)
    }
}

/// Worst status across all services, unless the host itself is down
pub fn overall_status(alive: ReturnCode, services: &[ServiceCheckResult]) -> ReturnCode {
    if alive != ReturnCode::Ok {
        return alive;
    }

    services.iter().map(|s| s.return_code).max().unwrap_or(ReturnCode::Ok)
}
