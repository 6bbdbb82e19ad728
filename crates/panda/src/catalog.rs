//! Device catalog - merges host type templates with device definitions.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::{ConfigField, DeviceDef, HostTypeDef, MonitorConfig, ServiceDefinition};
use crate::driver::DriverRegistry;
use crate::error::MonitorError;
use crate::slug::slugify;
use crate::types::HostCheckResult;

/// Longest check interval accepted, one year in minutes
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

/// Template shared by every device of one type
#[derive(Debug, Clone, Serialize)]
pub struct HostType {
    pub type_id: String,
    pub name: String,
    /// Minutes between checks
    pub interval: u64,
    pub check_attempts: u32,
    pub info: Option<String>,
    pub icon: Option<String>,
    pub config_schema: BTreeMap<String, ConfigField>,
    pub default_services: Vec<ServiceDefinition>,
    pub ping_command: Option<String>,
}

impl HostType {
    pub fn from_def(type_id: &str, def: &HostTypeDef, config: &MonitorConfig) -> Self {
        Self {
            type_id: type_id.to_string(),
            name: def.name.clone(),
            interval: def.interval.unwrap_or(config.default_interval),
            check_attempts: def.check_attempts.unwrap_or(config.service_check_attempts),
            info: def.info.clone(),
            icon: def.icon.clone(),
            config_schema: def.config.clone(),
            default_services: def.services.clone(),
            ping_command: def.ping_command.clone(),
        }
    }

    /// Apply schema defaults and verify required keys are present
    fn check_config(
        &self,
        device_name: &str,
        config: &mut BTreeMap<String, Value>,
    ) -> Result<(), MonitorError> {
        for (field, schema) in &self.config_schema {
            if config.contains_key(field) {
                continue;
            }

            match &schema.default {
                Some(default) => {
                    config.insert(field.clone(), default.clone());
                }
                None if schema.required => {
                    return Err(MonitorError::RequiredConfigMissing {
                        device: device_name.to_string(),
                        field: field.clone(),
                        type_id: self.type_id.clone(),
                    });
                }
                None => {}
            }
        }

        Ok(())
    }
}

/// Fully resolved device, owned by the scheduler
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub address: String,
    pub type_id: String,
    /// Device config, always contains `address`
    pub config: BTreeMap<String, Value>,
    /// Minutes between checks
    pub interval: u64,
    pub check_attempts: u32,
    /// Type default services followed by the device's own
    pub services: Vec<ServiceDefinition>,
    pub icon: String,
    pub info: String,
    pub management_page: Option<String>,
    pub notifier: Option<String>,
    pub ping_command: Option<String>,
    pub last_check: Option<DateTime<Utc>>,
    pub next_check: DateTime<Utc>,
    pub silenced_until: Option<DateTime<Utc>>,
    /// Snapshot of the last completed check, the base for the next state transition
    #[serde(skip)]
    pub last_result: Option<HostCheckResult>,
}

impl Device {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_check
    }

    pub fn is_silenced(&self, now: DateTime<Utc>) -> bool {
        self.silenced_until.is_some_and(|until| until > now)
    }

    /// Time between two checks
    pub fn check_interval(&self) -> Duration {
        Duration::minutes(self.interval.min(MAX_INTERVAL_MINUTES) as i64)
    }
}

/// Build the host type table from the configuration
pub fn load_host_types(config: &MonitorConfig) -> BTreeMap<String, HostType> {
    config
        .types
        .iter()
        .map(|(type_id, def)| (type_id.clone(), HostType::from_def(type_id, def, config)))
        .collect()
}

/// Resolve every device definition against its host type
pub fn resolve(
    host_types: &BTreeMap<String, HostType>,
    device_defs: &[DeviceDef],
    registry: &DriverRegistry,
) -> Result<Vec<Device>, MonitorError> {
    let mut seen = HashSet::new();
    let mut devices = Vec::with_capacity(device_defs.len());

    for def in device_defs {
        let device = resolve_device(host_types, def, registry)?;

        if !seen.insert(device.id.clone()) {
            return Err(MonitorError::DuplicateDevice(device.id));
        }

        info!(
            device = %device.name,
            interval = device.interval,
            "Loading device with check interval every {} min",
            device.interval
        );
        devices.push(device);
    }

    Ok(devices)
}

fn resolve_device(
    host_types: &BTreeMap<String, HostType>,
    def: &DeviceDef,
    registry: &DriverRegistry,
) -> Result<Device, MonitorError> {
    let host_type = host_types.get(&def.type_id).ok_or_else(|| MonitorError::DeviceTypeNotFound {
        device: def.name.clone(),
        type_id: def.type_id.clone(),
    })?;
    let driver = registry.get(&def.type_id);

    let mut config = def.config.clone();
    host_type.check_config(&def.name, &mut config)?;
    config.insert("address".to_string(), Value::String(def.address.clone()));

    let interval = def.interval.unwrap_or(host_type.interval);
    if interval > MAX_INTERVAL_MINUTES {
        return Err(MonitorError::InvalidInterval { device: def.name.clone(), interval });
    }

    let services = host_type
        .default_services
        .iter()
        .chain(def.services.iter())
        .cloned()
        .collect();

    Ok(Device {
        id: slugify(&def.name),
        name: def.name.clone(),
        address: def.address.clone(),
        type_id: def.type_id.clone(),
        config,
        interval,
        check_attempts: def.check_attempts.unwrap_or(host_type.check_attempts),
        services,
        icon: def
            .icon
            .clone()
            .or_else(|| host_type.icon.clone())
            .unwrap_or_else(|| driver.icon().to_string()),
        info: def
            .info
            .clone()
            .or_else(|| host_type.info.clone())
            .unwrap_or_else(|| driver.info().to_string()),
        management_page: def.management_page.clone(),
        notifier: def.notifier.clone(),
        ping_command: host_type.ping_command.clone(),
        last_check: None,
        next_check: DateTime::<Utc>::MIN_UTC,
        silenced_until: None,
        last_result: None,
    })
}
