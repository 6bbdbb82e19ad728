//! Panda - device health-monitoring engine for Trash Panda
//!
//! This library probes a set of network devices on a schedule, turns the raw
//! probe output into stateful service records and routes notifications when a
//! device or one of its services changes state.

pub mod catalog;
pub mod compiler;
pub mod config;
pub mod driver;
pub mod error;
pub mod notify;
pub mod perf;
pub mod probe;
pub mod scheduler;
pub mod slug;
pub mod state;
pub mod store;
pub mod template;
pub mod types;

// Re-export main types
pub use catalog::{Device, HostType};
pub use config::{MonitorConfig, ServiceCommand, ServiceDefinition};
pub use error::{MonitorError, StoreError};
pub use notify::NotificationRouter;
pub use scheduler::Monitor;
pub use store::{HistoryStore, MemoryStore, SqlStore};
pub use types::{HostCheckResult, Metric, ReturnCode, ServiceCheckResult, ServiceState};

/// Panda result type
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Name of the synthetic liveness service every device carries
pub const ALIVE_SERVICE: &str = "Alive";

/// Default directory holding the nagios plugins used by service templates
pub const NAGIOS_PATH: &str = "/usr/lib/nagios/plugins";
