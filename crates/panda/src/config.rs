//! Engine configuration types.
//!
//! These structures describe an already validated configuration. The service
//! binary deserializes them from its config file; tests build them directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Default check interval in minutes
    #[serde(default = "default_interval")]
    pub default_interval: u64,

    /// Default number of attempts before a new status is confirmed
    #[serde(default = "default_check_attempts")]
    pub service_check_attempts: u32,

    /// Check every device right away instead of waiting one interval
    #[serde(default = "default_true")]
    pub check_on_startup: bool,

    /// Operator supplied constants available to every template
    #[serde(default, alias = "jinja_constants")]
    pub constants: BTreeMap<String, Value>,

    #[serde(default)]
    pub notifications: Option<NotificationsConfig>,

    /// Host type definitions keyed by type id
    #[serde(default)]
    pub types: BTreeMap<String, HostTypeDef>,

    #[serde(default)]
    pub hosts: Vec<DeviceDef>,

    /// Service command templates keyed by service type
    #[serde(default)]
    pub services: BTreeMap<String, ServiceCommand>,

    /// Timeout for a single probe in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Devices checked in parallel during one pass
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_checks: usize,

    /// Pause between two service checks on the same device
    #[serde(default = "default_check_delay")]
    pub check_delay_ms: u64,

    #[serde(default)]
    pub alive_failure_policy: AliveFailurePolicy,

    /// Directory holding bundled check scripts
    #[serde(default = "default_scripts_path")]
    pub scripts_path: String,
}

fn default_interval() -> u64 {
    5
}

fn default_check_attempts() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_probe_timeout() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    4
}

fn default_check_delay() -> u64 {
    2000
}

fn default_scripts_path() -> String {
    "check_scripts".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            default_interval: default_interval(),
            service_check_attempts: default_check_attempts(),
            check_on_startup: true,
            constants: BTreeMap::new(),
            notifications: None,
            types: BTreeMap::new(),
            hosts: Vec::new(),
            services: BTreeMap::new(),
            probe_timeout_secs: default_probe_timeout(),
            max_concurrent_checks: default_max_concurrent(),
            check_delay_ms: default_check_delay(),
            alive_failure_policy: AliveFailurePolicy::default(),
            scripts_path: default_scripts_path(),
        }
    }
}

/// What to do with the remaining services when the Alive check fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliveFailurePolicy {
    /// Mark every service Unknown without probing it
    #[default]
    SkipServices,
    /// Probe the services anyway
    CheckServices,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Channel used when neither the service nor the host pick one
    pub primary: String,

    #[serde(default)]
    pub types: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "type")]
    pub channel_type: String,

    #[serde(default)]
    pub args: BTreeMap<String, Value>,
}

/// A host type as written in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostTypeDef {
    pub name: String,

    #[serde(default)]
    pub interval: Option<u64>,

    #[serde(default)]
    pub check_attempts: Option<u32>,

    #[serde(default)]
    pub info: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub config: BTreeMap<String, ConfigField>,

    #[serde(default)]
    pub services: Vec<ServiceDefinition>,

    /// Replaces the ICMP liveness probe, exit code 0 means alive
    #[serde(default)]
    pub ping_command: Option<String>,
}

/// Schema entry for one device config key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigField {
    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default: Option<Value>,
}

/// A device as written in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceDef {
    pub name: String,

    pub address: String,

    #[serde(rename = "type")]
    pub type_id: String,

    #[serde(default)]
    pub config: BTreeMap<String, Value>,

    #[serde(default)]
    pub services: Vec<ServiceDefinition>,

    #[serde(default)]
    pub interval: Option<u64>,

    #[serde(default)]
    pub check_attempts: Option<u32>,

    #[serde(default)]
    pub info: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub management_page: Option<String>,

    #[serde(default)]
    pub notifier: Option<String>,
}

/// Declarative description of a service check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub service_type: String,

    #[serde(default)]
    pub args: BTreeMap<String, Value>,

    #[serde(default)]
    pub output_filter: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub service_url: Option<String>,

    #[serde(default)]
    pub notifier: Option<String>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self { name: name.into(), service_type: service_type.into(), ..Default::default() }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// Command template registered for a service type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceCommand {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl ServiceCommand {
    pub fn new(command: impl Into<String>, args: &[&str]) -> Self {
        Self { command: command.into(), args: args.iter().map(|a| a.to_string()).collect() }
    }
}

/// Render a config value as template text
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
