use thiserror::Error;

use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("There is no device type definition '{type_id}' referenced in host config for {device}")]
    DeviceTypeNotFound { device: String, type_id: String },

    #[error(
        "A config value ({field}) for device {device} is missing but required for device type {type_id}"
    )]
    RequiredConfigMissing { device: String, field: String, type_id: String },

    #[error("Check interval of {interval} minutes for device {device} is out of range")]
    InvalidInterval { device: String, interval: u64 },

    #[error("Device id '{0}' is used by more than one host")]
    DuplicateDevice(String),

    #[error("There is no definition for service: {0}")]
    ServiceTypeNotFound(String),

    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
