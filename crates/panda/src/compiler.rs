//! Check command compiler - turns a service definition into an argv.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::NAGIOS_PATH;
use crate::config::{MonitorConfig, ServiceCommand, ServiceDefinition, value_to_string};
use crate::driver::DriverRegistry;
use crate::error::MonitorError;
use crate::template::{self, Context};

/// Compiles service definitions using the registered command templates
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    commands: BTreeMap<String, ServiceCommand>,
    paths: Context,
    constants: Context,
}

impl CommandCompiler {
    pub fn new(
        commands: BTreeMap<String, ServiceCommand>,
        constants: &BTreeMap<String, Value>,
        scripts_path: &str,
    ) -> Self {
        let mut paths = Context::new();
        paths.insert("NAGIOS_PATH".to_string(), NAGIOS_PATH.to_string());
        paths.insert("CHECK_SCRIPTS".to_string(), scripts_path.to_string());

        Self { commands, paths, constants: to_context(constants) }
    }

    /// Driver templates first, configured services override them
    pub fn from_config(config: &MonitorConfig, registry: &DriverRegistry) -> Self {
        let mut commands = registry.builtin_services();
        commands.extend(config.services.clone());
        Self::new(commands, &config.constants, &config.scripts_path)
    }

    /// Template context for one service on one device.
    ///
    /// Later layers override earlier ones: fixed paths, service args, device
    /// config, operator constants.
    pub fn context(
        &self,
        service: Option<&ServiceDefinition>,
        device_config: &BTreeMap<String, Value>,
    ) -> Context {
        let mut context = self.paths.clone();
        if let Some(service) = service {
            context.extend(to_context(&service.args));
        }
        context.extend(to_context(device_config));
        context.extend(self.constants.clone());
        context
    }

    /// Build the argument vector for a service check
    pub fn compile(
        &self,
        service: &ServiceDefinition,
        device_config: &BTreeMap<String, Value>,
    ) -> Result<Vec<String>, MonitorError> {
        let command = self
            .commands
            .get(&service.service_type)
            .ok_or_else(|| MonitorError::ServiceTypeNotFound(service.service_type.clone()))?;
        let context = self.context(Some(service), device_config);

        let mut argv = split_command(&template::render(&command.command, &context)?);
        for arg in &command.args {
            argv.push(template::render(arg, &context)?);
        }

        Ok(argv)
    }

    /// Render a bare command template, used for custom liveness commands
    pub fn compile_command(
        &self,
        command: &str,
        device_config: &BTreeMap<String, Value>,
    ) -> Result<Vec<String>, MonitorError> {
        let context = self.context(None, device_config);
        Ok(split_command(&template::render(command, &context)?))
    }

    /// Apply the service's output filter to raw probe text
    pub fn filter_output(
        &self,
        service: &ServiceDefinition,
        device_config: &BTreeMap<String, Value>,
        raw_text: &str,
    ) -> Result<String, MonitorError> {
        match &service.output_filter {
            Some(filter) => {
                let mut context = self.context(Some(service), device_config);
                context.insert("value".to_string(), raw_text.trim().to_string());
                Ok(template::render(filter, &context)?)
            }
            None => Ok(raw_text.to_string()),
        }
    }
}

fn to_context(values: &BTreeMap<String, Value>) -> Context {
    values.iter().map(|(k, v)| (k.clone(), value_to_string(v))).collect()
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}
