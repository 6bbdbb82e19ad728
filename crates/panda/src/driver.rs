//! Device drivers - behavior attached to a device type.
//!
//! A driver is looked up by type id in a static registry. It contributes
//! extra checks, the names of the services it runs and the user commands a
//! device of that type supports. Unknown type ids fall back to the generic
//! driver.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::Device;
use crate::config::{ServiceCommand, ServiceDefinition};

/// A command a user can trigger on a device from the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCommand {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
}

/// Behavior shared by every device of one type
pub trait DeviceDriver: Send + Sync {
    fn type_id(&self) -> &'static str;

    fn info(&self) -> &'static str;

    fn icon(&self) -> &'static str {
        "devices"
    }

    /// Checks the driver runs in addition to the declared services
    fn custom_checks(&self, _device: &Device) -> Vec<ServiceDefinition> {
        Vec::new()
    }

    /// Names of every service a device of this type reports
    fn service_names(&self, device: &Device) -> Vec<String> {
        let mut names: Vec<String> = device
            .services
            .iter()
            .chain(self.custom_checks(device).iter())
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names
    }

    fn commands(&self) -> Vec<DeviceCommand> {
        Vec::new()
    }

    /// Command templates needed by `custom_checks`
    fn builtin_services(&self) -> Vec<(String, ServiceCommand)> {
        Vec::new()
    }
}

/// Up/down only device
pub struct GenericDriver;

impl DeviceDriver for GenericDriver {
    fn type_id(&self) -> &'static str {
        "generic"
    }

    fn info(&self) -> &'static str {
        "This is a generic network device that checks up/down status only."
    }
}

/// Managed network switch, checks come from the configured SNMP services
pub struct SwitchDriver;

impl DeviceDriver for SwitchDriver {
    fn type_id(&self) -> &'static str {
        "switch"
    }

    fn info(&self) -> &'static str {
        "A managed network switch. Service checks are run over SNMP using the configured community."
    }

    fn icon(&self) -> &'static str {
        "switch"
    }
}

/// Stand alone ESXi host
pub struct EsxiDriver;

const ESXI_CHECKS: [(&str, &str); 3] =
    [("VM Status", "vms"), ("Datastores", "datastore"), ("Host Status", "status")];

impl DeviceDriver for EsxiDriver {
    fn type_id(&self) -> &'static str {
        "esxi"
    }

    fn info(&self) -> &'static str {
        "This device type works with stand alone ESXi devices. Username and password information \
         for a local user with admin permissions must be set for queries and commands to function."
    }

    fn icon(&self) -> &'static str {
        "server"
    }

    fn custom_checks(&self, _device: &Device) -> Vec<ServiceDefinition> {
        ESXI_CHECKS
            .iter()
            .map(|(name, mode)| ServiceDefinition::new(*name, "check_esxi").with_arg("mode", *mode))
            .collect()
    }

    fn commands(&self) -> Vec<DeviceCommand> {
        vec![DeviceCommand {
            name: "Shutdown VMs".to_string(),
            kind: "button".to_string(),
            command: "shutdown_vms".to_string(),
        }]
    }

    fn builtin_services(&self) -> Vec<(String, ServiceCommand)> {
        vec![(
            "check_esxi".to_string(),
            ServiceCommand::new(
                "python3 {{ path(CHECK_SCRIPTS, 'check_esxi.py') }}",
                &[
                    "-H", "{{ address }}", "-U", "{{ username }}", "-P", "{{ password }}", "-p",
                    "{{ port | default(443) }}", "-c", "90", "-w", "85", "-t", "{{ mode }}",
                ],
            ),
        )]
    }
}

/// Maps type ids onto drivers
#[derive(Clone)]
pub struct DriverRegistry {
    drivers: BTreeMap<&'static str, Arc<dyn DeviceDriver>>,
    fallback: Arc<dyn DeviceDriver>,
}

impl DriverRegistry {
    /// Registry with every driver shipped with panda
    pub fn builtin() -> Self {
        let mut registry = Self { drivers: BTreeMap::new(), fallback: Arc::new(GenericDriver) };
        registry.register(Arc::new(GenericDriver));
        registry.register(Arc::new(SwitchDriver));
        registry.register(Arc::new(EsxiDriver));
        registry
    }

    pub fn register(&mut self, driver: Arc<dyn DeviceDriver>) {
        self.drivers.insert(driver.type_id(), driver);
    }

    /// Driver for a type id, the generic driver when none is registered
    pub fn get(&self, type_id: &str) -> Arc<dyn DeviceDriver> {
        self.drivers.get(type_id).cloned().unwrap_or_else(|| self.fallback.clone())
    }

    /// Command templates contributed by all drivers
    pub fn builtin_services(&self) -> BTreeMap<String, ServiceCommand> {
        self.drivers.values().flat_map(|d| d.builtin_services()).collect()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::device;

    #[test]
    fn test_unknown_type_falls_back_to_generic() {
        let registry = DriverRegistry::builtin();
        assert_eq!(registry.get("nas").type_id(), "generic");
        assert_eq!(registry.get("esxi").type_id(), "esxi");
    }

    #[test]
    fn test_esxi_custom_checks_and_commands() {
        let registry = DriverRegistry::builtin();
        let driver = registry.get("esxi");
        let esxi = device("esx01", "esxi");

        let checks = driver.custom_checks(&esxi);
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(|c| c.service_type == "check_esxi"));
        assert_eq!(
            driver.service_names(&esxi),
            vec!["Datastores".to_string(), "Host Status".to_string(), "VM Status".to_string()]
        );
        assert_eq!(driver.commands()[0].command, "shutdown_vms");
        assert!(registry.builtin_services().contains_key("check_esxi"));
    }

    #[test]
    fn test_generic_service_names_come_from_definitions() {
        let registry = DriverRegistry::builtin();
        let mut host = device("web", "generic");
        host.services.push(ServiceDefinition::new("HTTP", "check_http"));
        assert_eq!(registry.get("generic").service_names(&host), vec!["HTTP".to_string()]);
        assert!(registry.get("generic").commands().is_empty());
    }
}
