//! Fake probes and fixtures shared by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use panda::config::{ConfigField, DeviceDef, HostTypeDef};
use panda::notify::{Notification, NotificationChannel, NotificationRouter};
use panda::probe::{LivenessProber, PingReport, ProbeOutput, ProbeRunner};
use panda::store::{MetricSample, StoreResult};
use panda::{
    HistoryStore, HostCheckResult, MemoryStore, Monitor, MonitorConfig, ReturnCode,
    ServiceCheckResult, ServiceCommand, ServiceDefinition, StoreError,
};
use serde_json::Value;
use tokio::sync::Notify;

/// Probe runner answering from a table keyed by program name
#[derive(Default)]
pub struct FakeRunner {
    outputs: Mutex<HashMap<String, ProbeOutput>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, program: &str, output: ProbeOutput) {
        self.outputs.lock().unwrap().insert(program.to_string(), output);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|argv| argv[0] == program).count()
    }
}

#[async_trait::async_trait]
impl ProbeRunner for FakeRunner {
    async fn run(&self, argv: &[String]) -> ProbeOutput {
        self.calls.lock().unwrap().push(argv.to_vec());
        self.outputs
            .lock()
            .unwrap()
            .get(&argv[0])
            .cloned()
            .unwrap_or_else(|| ProbeOutput::failed(format!("{} not found", argv[0])))
    }
}

/// Liveness prober with a per address answer, addresses default to up
#[derive(Default)]
pub struct FakeProber {
    down: Mutex<Vec<String>>,
}

impl FakeProber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, address: &str, down: bool) {
        let mut addresses = self.down.lock().unwrap();
        addresses.retain(|a| a != address);
        if down {
            addresses.push(address.to_string());
        }
    }
}

#[async_trait::async_trait]
impl LivenessProber for FakeProber {
    async fn ping(&self, address: &str) -> PingReport {
        if self.down.lock().unwrap().iter().any(|a| a == address) {
            PingReport::unreachable()
        } else {
            PingReport { transmitted: 5, received: 5, avg_rtt_ms: Some(0.4) }
        }
    }
}

/// Channel keeping every message it was asked to send
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingChannel {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.message.clone()).collect()
    }
}

#[async_trait::async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Channel that takes `delay` to deliver each message
pub struct SlowChannel {
    delay: Duration,
    pub started: Notify,
    pub sent: Mutex<Vec<Notification>>,
}

impl SlowChannel {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay, started: Notify::new(), sent: Mutex::new(Vec::new()) })
    }
}

#[async_trait::async_trait]
impl NotificationChannel for SlowChannel {
    fn name(&self) -> &str {
        "slow"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Memory store whose reads and writes can be switched to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn check(flag: &AtomicBool) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Pool("disk full".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl HistoryStore for FlakyStore {
    async fn get_host(&self, id: &str) -> StoreResult<Option<HostCheckResult>> {
        Self::check(&self.fail_reads)?;
        self.inner.get_host(id).await
    }

    async fn save_host(&self, id: &str, host: &HostCheckResult) -> StoreResult<()> {
        Self::check(&self.fail_writes)?;
        self.inner.save_host(id, host).await
    }

    async fn set_hosts(&self, ids: &[String]) -> StoreResult<()> {
        self.inner.set_hosts(ids).await
    }

    async fn list_hosts(&self) -> StoreResult<Vec<HostCheckResult>> {
        Self::check(&self.fail_reads)?;
        self.inner.list_hosts().await
    }

    async fn get_last_check(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Self::check(&self.fail_reads)?;
        self.inner.get_last_check().await
    }

    async fn save_last_check(&self, at: DateTime<Utc>) -> StoreResult<()> {
        Self::check(&self.fail_writes)?;
        self.inner.save_last_check(at).await
    }

    async fn get_service(
        &self,
        host_id: &str,
        service_id: &str,
    ) -> StoreResult<Option<ServiceCheckResult>> {
        Self::check(&self.fail_reads)?;
        self.inner.get_service(host_id, service_id).await
    }

    async fn services_by_status(&self, codes: &[ReturnCode]) -> StoreResult<Vec<ServiceCheckResult>> {
        Self::check(&self.fail_reads)?;
        self.inner.services_by_status(codes).await
    }

    async fn services_with_tag(&self, tag: &str) -> StoreResult<Vec<ServiceCheckResult>> {
        Self::check(&self.fail_reads)?;
        self.inner.services_with_tag(tag).await
    }

    async fn metric_history(
        &self,
        metric_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<MetricSample>> {
        Self::check(&self.fail_reads)?;
        self.inner.metric_history(metric_id, start, end).await
    }
}

pub const SNMP_OK: &str = "SNMP OK - Timeticks: (12345) 0:02:03.45 | uptime=12345;;;;";

/// A switch type with an uptime check and one device using it
pub fn switch_config() -> MonitorConfig {
    let mut config = MonitorConfig { check_delay_ms: 0, ..Default::default() };

    config.services.insert(
        "snmp_uptime".to_string(),
        ServiceCommand::new("check_snmp", &["-H", "{{ address }}", "-C", "{{ community }}"]),
    );

    let mut switch = HostTypeDef {
        name: "Switch".to_string(),
        services: vec![ServiceDefinition::new("Switch Uptime", "snmp_uptime")],
        ..Default::default()
    };
    switch.config.insert("community".to_string(), ConfigField { required: true, default: None });
    config.types.insert("switch".to_string(), switch);

    config.hosts.push(device("Core Switch", "10.0.0.2", "switch", &[("community", "public")]));
    config
}

pub fn device(name: &str, address: &str, type_id: &str, config: &[(&str, &str)]) -> DeviceDef {
    DeviceDef {
        name: name.to_string(),
        address: address.to_string(),
        type_id: type_id.to_string(),
        config: config
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect::<BTreeMap<_, _>>(),
        ..Default::default()
    }
}

pub struct Harness {
    pub monitor: Monitor,
    pub runner: Arc<FakeRunner>,
    pub prober: Arc<FakeProber>,
    pub store: Arc<MemoryStore>,
    pub channel: Arc<RecordingChannel>,
}

pub async fn harness(config: &MonitorConfig) -> Harness {
    harness_with_store(config, Arc::new(MemoryStore::new())).await
}

pub async fn harness_with_store(config: &MonitorConfig, store: Arc<MemoryStore>) -> Harness {
    let channel = Arc::new(RecordingChannel::default());
    let (monitor, runner, prober) = monitor_with(config, store.clone(), channel.clone()).await;

    Harness { monitor, runner, prober, store, channel }
}

/// Monitor on fake probes with any store and a single channel
pub async fn monitor_with(
    config: &MonitorConfig,
    store: Arc<dyn HistoryStore>,
    channel: Arc<dyn NotificationChannel>,
) -> (Monitor, Arc<FakeRunner>, Arc<FakeProber>) {
    let _ = tracing_subscriber::fmt::try_init();

    let runner = FakeRunner::new();
    runner.respond("check_snmp", ProbeOutput::new(0, SNMP_OK));
    let prober = FakeProber::new();

    let monitor = Monitor::with_probes(config, store, runner.clone(), prober.clone())
        .await
        .unwrap()
        .with_router(NotificationRouter::new("all", vec![channel]));

    (monitor, runner, prober)
}
