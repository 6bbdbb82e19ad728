//! Interval scheduler - owns the devices and runs check cycles.
//!
//! Every pass picks the devices whose `next_check` has passed, checks them
//! concurrently up to `max_concurrent_checks`, advances the state machine of
//! every service and persists the new snapshots. The device map is locked
//! while devices are checked and updated; `check_now` and `silence_host` take
//! the same lock. Notifications go out once the lock is released.
//!
//! The previous snapshot of each device lives in the device map. The store
//! only seeds it at startup, so a failing store never resets confirmation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use rand::Rng;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::catalog::{Device, load_host_types, resolve};
use crate::compiler::CommandCompiler;
use crate::config::{AliveFailurePolicy, MonitorConfig, ServiceDefinition};
use crate::driver::{DeviceCommand, DriverRegistry};
use crate::error::MonitorError;
use crate::notify::NotificationRouter;
use crate::probe::{CommandRunner, LivenessProber, PingProber, ProbeRunner};
use crate::store::HistoryStore;
use crate::types::{HostCheckResult, ReturnCode, ServiceCheckResult, overall_status, service_id};
use crate::{ALIVE_SERVICE, Result, perf, state};

/// Maximum random offset applied to every scheduled check, in seconds
pub const CHECK_JITTER_SECS: i64 = 60;

/// Outcome of a `check_now` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckNowResponse {
    pub success: bool,
    pub next_check: Option<DateTime<Utc>>,
}

/// Outcome of a `silence_host` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SilenceResponse {
    pub success: bool,
    pub is_silenced: bool,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct Settings {
    check_delay: StdDuration,
    max_concurrent_checks: usize,
    alive_failure_policy: AliveFailurePolicy,
}

/// A checked device, with the snapshot it replaces
struct DeviceCheck {
    device: Device,
    previous: Option<HostCheckResult>,
    current: HostCheckResult,
}

pub struct Monitor {
    devices: Mutex<BTreeMap<String, Device>>,
    compiler: CommandCompiler,
    registry: DriverRegistry,
    runner: Arc<dyn ProbeRunner>,
    prober: Arc<dyn LivenessProber>,
    store: Arc<dyn HistoryStore>,
    router: NotificationRouter,
    settings: Settings,
}

impl Monitor {
    /// Monitor running checks as child processes and pinging with the system `ping`
    pub async fn from_config(config: &MonitorConfig, store: Arc<dyn HistoryStore>) -> Result<Self> {
        let runner: Arc<dyn ProbeRunner> = Arc::new(CommandRunner::new(config.probe_timeout_secs));
        let prober = Arc::new(PingProber::new(runner.clone()));
        Self::with_probes(config, store, runner, prober).await
    }

    /// Monitor using the given probe implementations
    pub async fn with_probes(
        config: &MonitorConfig,
        store: Arc<dyn HistoryStore>,
        runner: Arc<dyn ProbeRunner>,
        prober: Arc<dyn LivenessProber>,
    ) -> Result<Self> {
        let registry = DriverRegistry::builtin();
        let host_types = load_host_types(config);
        let mut devices = resolve(&host_types, &config.hosts, &registry)?;

        let now = Utc::now();
        for device in &mut devices {
            if !config.check_on_startup {
                device.next_check = now + device.check_interval();
            }

            match store.get_host(&device.id).await {
                Ok(Some(snapshot)) => {
                    // keep silences and service states across restarts
                    device.silenced_until = snapshot.silenced_until;
                    device.last_check = Some(snapshot.last_check);
                    device.last_result = Some(snapshot);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(host = %device.id, "Failed to read stored snapshot, starting without history: {}", e);
                }
            }
        }

        let ids: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();
        store.set_hosts(&ids).await?;
        info!("Loaded {} devices", ids.len());

        Ok(Self {
            devices: Mutex::new(devices.into_iter().map(|d| (d.id.clone(), d)).collect()),
            compiler: CommandCompiler::from_config(config, &registry),
            registry,
            runner,
            prober,
            store,
            router: NotificationRouter::from_config(config.notifications.as_ref()),
            settings: Settings {
                check_delay: StdDuration::from_millis(config.check_delay_ms),
                max_concurrent_checks: config.max_concurrent_checks.max(1),
                alive_failure_policy: config.alive_failure_policy,
            },
        })
    }

    /// Replace the notification router built from the configuration
    pub fn with_router(mut self, router: NotificationRouter) -> Self {
        self.router = router;
        self
    }

    pub fn store(&self) -> Arc<dyn HistoryStore> {
        self.store.clone()
    }

    /// Run one pass over the devices that are due
    pub async fn check_hosts(&self) -> Result<Vec<HostCheckResult>> {
        self.check_hosts_at(Utc::now()).await
    }

    /// Run one pass as if the clock read `now`.
    ///
    /// Store failures do not stop the pass: every due device is still checked,
    /// updated and notified, and the first failure is returned afterwards.
    pub async fn check_hosts_at(&self, now: DateTime<Utc>) -> Result<Vec<HostCheckResult>> {
        let mut first_error: Option<MonitorError> = None;

        let checks = {
            let mut devices = self.devices.lock().await;

            let due: Vec<Device> = devices.values().filter(|d| d.is_due(now)).cloned().collect();
            if due.is_empty() {
                debug!("No devices due for a check");
                return Ok(Vec::new());
            }
            info!("Checking {} due devices", due.len());

            let checks: Vec<DeviceCheck> = stream::iter(due)
                .map(|device| async move { self.check_device(device, now).await })
                .buffer_unordered(self.settings.max_concurrent_checks)
                .collect()
                .await;

            for check in &checks {
                if let Some(device) = devices.get_mut(&check.current.id) {
                    device.last_check = Some(now);
                    device.next_check = check.current.next_check;
                    device.last_result = Some(check.current.clone());
                }

                if let Err(e) = self.store.save_host(&check.current.id, &check.current).await {
                    error!(host = %check.current.id, "Failed to save host snapshot: {}", e);
                    first_error.get_or_insert(e.into());
                }
            }

            if let Err(e) = self.store.save_last_check(now).await {
                error!("Failed to save last check time: {}", e);
                first_error.get_or_insert(e.into());
            }

            checks
        };

        let mut notifications = Vec::with_capacity(checks.len());
        for check in &checks {
            notifications.push(self.notify(check, now));
        }
        join_all(notifications).await;

        match first_error {
            Some(e) => Err(e),
            None => Ok(checks.into_iter().map(|check| check.current).collect()),
        }
    }

    async fn notify(&self, check: &DeviceCheck, now: DateTime<Utc>) {
        let previous = check.previous.as_ref();

        let host = self.router.notify_host_change(&check.device, previous, &check.current, now);

        let mut services = Vec::with_capacity(check.current.services.len());
        for service in &check.current.services {
            let old = previous.and_then(|p| p.service(&service.id));
            services.push(self.router.notify_service_change(&check.device, old, service, now));
        }

        futures::join!(host, join_all(services));
    }

    /// Check one device, does not touch the device map
    async fn check_device(&self, mut device: Device, now: DateTime<Utc>) -> DeviceCheck {
        let previous = device.last_result.take();
        debug!(host = %device.id, "Checking device");

        let alive = self.check_alive(&device).await;
        let alive_code = alive.return_code;
        let mut raw_results = vec![alive];

        let driver = self.registry.get(&device.type_id);
        let definitions: Vec<ServiceDefinition> =
            device.services.iter().cloned().chain(driver.custom_checks(&device)).collect();

        let skip_services = alive_code != ReturnCode::Ok
            && self.settings.alive_failure_policy == AliveFailurePolicy::SkipServices;

        if skip_services {
            info!(host = %device.id, "Host is not alive, skipping service checks");
            raw_results.extend(
                definitions.iter().map(|def| ServiceCheckResult::not_attempted(&device.id, &def.name)),
            );
        } else {
            for (i, definition) in definitions.iter().enumerate() {
                if i > 0 && !self.settings.check_delay.is_zero() {
                    tokio::time::sleep(self.settings.check_delay).await;
                }
                raw_results.push(self.check_service(&device, definition).await);
            }
        }

        let mut services: Vec<ServiceCheckResult> = raw_results
            .into_iter()
            .map(|result| {
                let old = previous.as_ref().and_then(|p| p.service(&result.id));
                state::advance(old, result, device.check_attempts, now)
            })
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));

        let current = HostCheckResult {
            id: device.id.clone(),
            name: device.name.clone(),
            address: device.address.clone(),
            type_id: device.type_id.clone(),
            icon: device.icon.clone(),
            info: device.info.clone(),
            management_page: device.management_page.clone(),
            interval: device.interval,
            silenced_until: device.silenced_until,
            overall_status: overall_status(alive_code, &services),
            services,
            alive: alive_code,
            last_check: now,
            next_check: next_check(now, device.check_interval()),
        };

        debug!(
            host = %device.id,
            status = %current.overall_status,
            next_check = %current.next_check,
            "Device checked"
        );
        DeviceCheck { device, previous, current }
    }

    /// Liveness check, the custom ping command of the type when there is one
    async fn check_alive(&self, device: &Device) -> ServiceCheckResult {
        let id = service_id(&device.id, ALIVE_SERVICE);

        if let Some(command) = &device.ping_command {
            return match self.compiler.compile_command(command, &device.config) {
                Ok(argv) => {
                    let output = self.runner.run(&argv).await;
                    let raw = output.text().to_string();
                    // only a clean exit means the device answered
                    let code =
                        if output.exit_code == Some(0) { ReturnCode::Ok } else { ReturnCode::Critical };
                    ServiceCheckResult::new(&device.id, ALIVE_SERVICE, code, raw.clone())
                        .with_perf_data(perf::parse(&id, &raw))
                }
                Err(e) => {
                    warn!(host = %device.id, "Failed to compile ping command: {}", e);
                    ServiceCheckResult::new(&device.id, ALIVE_SERVICE, ReturnCode::Unknown, e.to_string())
                }
            };
        }

        let report = self.prober.ping(&device.address).await;
        let (code, label) =
            if report.is_alive() { (ReturnCode::Ok, "OK") } else { (ReturnCode::Critical, "CRITICAL") };
        let text = format!(
            "PING {} - Packet loss = {:.0}%, RTA = {:.2} ms",
            label,
            report.packet_loss() * 100.0,
            report.avg_rtt_ms.unwrap_or(0.0)
        );
        let raw = format!("{} | {}", text, report.perf_data());

        ServiceCheckResult::new(&device.id, ALIVE_SERVICE, code, text)
            .with_perf_data(perf::parse(&id, &raw))
            .with_raw_text(raw)
    }

    async fn check_service(&self, device: &Device, definition: &ServiceDefinition) -> ServiceCheckResult {
        let id = service_id(&device.id, &definition.name);

        let mut result = match self.compiler.compile(definition, &device.config) {
            Ok(argv) => {
                let output = self.runner.run(&argv).await;
                let raw = output.text().trim_end().to_string();
                let text = self
                    .compiler
                    .filter_output(definition, &device.config, &raw)
                    .unwrap_or_else(|e| {
                        warn!(service = %id, "Output filter failed: {}", e);
                        raw.clone()
                    });

                ServiceCheckResult::new(
                    &device.id,
                    &definition.name,
                    ReturnCode::from_exit_code(output.exit_code),
                    text,
                )
                .with_perf_data(perf::parse(&id, &raw))
                .with_raw_text(raw)
            }
            Err(e) => {
                warn!(service = %id, "Failed to compile check command: {}", e);
                ServiceCheckResult::new(&device.id, &definition.name, ReturnCode::Unknown, e.to_string())
            }
        };

        result.tags = definition.tags.clone();
        result.service_url = definition.service_url.clone();
        result.notifier = definition.notifier.clone();
        result
    }

    /// Ids of every loaded device
    pub async fn get_hosts(&self) -> Vec<String> {
        self.devices.lock().await.keys().cloned().collect()
    }

    pub async fn get_device(&self, id: &str) -> Option<Device> {
        self.devices.lock().await.get(id).cloned()
    }

    /// Make a device due on the next pass
    pub async fn check_now(&self, id: &str) -> CheckNowResponse {
        let mut devices = self.devices.lock().await;
        let Some(device) = devices.get_mut(id) else {
            return CheckNowResponse { success: false, next_check: None };
        };

        device.next_check = Utc::now();
        info!(host = %id, "Check requested");
        CheckNowResponse { success: true, next_check: Some(device.next_check) }
    }

    /// Suppress notifications for a device until `until`
    pub async fn silence_host(&self, id: &str, until: DateTime<Utc>) -> SilenceResponse {
        let mut devices = self.devices.lock().await;
        let Some(device) = devices.get_mut(id) else {
            return SilenceResponse { success: false, is_silenced: false, until: None };
        };

        device.silenced_until = Some(until);
        info!(host = %id, until = %until, "Host silenced");
        SilenceResponse { success: true, is_silenced: device.is_silenced(Utc::now()), until: Some(until) }
    }

    pub async fn is_silenced(&self, id: &str) -> bool {
        self.is_silenced_at(id, Utc::now()).await
    }

    pub async fn is_silenced_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.devices.lock().await.get(id).is_some_and(|d| d.is_silenced(now))
    }

    async fn ensure_known(&self, id: &str) -> Result<()> {
        if self.devices.lock().await.contains_key(id) {
            Ok(())
        } else {
            Err(MonitorError::HostNotFound(id.to_string()))
        }
    }

    /// Last stored snapshot of a device, `None` until its first check
    pub async fn host_status(&self, id: &str) -> Result<Option<HostCheckResult>> {
        self.ensure_known(id).await?;
        Ok(self.store.get_host(id).await?)
    }

    /// Last stored result of one service of a device
    pub async fn service_status(
        &self,
        host_id: &str,
        service_id: &str,
    ) -> Result<Option<ServiceCheckResult>> {
        self.ensure_known(host_id).await?;
        Ok(self.store.get_service(host_id, service_id).await?)
    }

    /// Time of the last completed pass, as recorded by the store
    pub async fn last_pass(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.store.get_last_check().await?)
    }

    /// User commands supported by a device, `None` for unknown ids
    pub async fn device_commands(&self, id: &str) -> Option<Vec<DeviceCommand>> {
        let devices = self.devices.lock().await;
        let device = devices.get(id)?;
        Some(self.registry.get(&device.type_id).commands())
    }

    /// Run a pass every `period` in a background task
    pub fn start_periodic_checks(self: Arc<Self>, period: StdDuration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                match self.check_hosts().await {
                    Ok(results) => {
                        debug!("Periodic check pass completed: {} devices checked", results.len());
                    }
                    Err(e) => {
                        warn!("Periodic check pass failed: {}", e);
                    }
                }
            }
        })
    }
}

/// `now + interval` shifted by a random jitter
fn next_check(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let jitter = rand::thread_rng().gen_range(-CHECK_JITTER_SECS..=CHECK_JITTER_SECS);
    now + interval + Duration::seconds(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_check_within_jitter() {
        let now = Utc::now();
        for _ in 0..100 {
            let next = next_check(now, Duration::minutes(5));
            let offset = (next - now - Duration::minutes(5)).num_seconds();
            assert!((-CHECK_JITTER_SECS..=CHECK_JITTER_SECS).contains(&offset));
        }
    }
}
