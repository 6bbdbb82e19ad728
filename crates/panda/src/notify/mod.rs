/// Notification routing
///
/// This module decides when a host or service change is worth a message and
/// which channels receive it:
/// - Host messages go out when the Alive status flips
/// - Service messages go out on confirmed status changes
/// - Channels are picked by the service, then the host, then the primary channel
pub mod channels;

pub use channels::{LogChannel, NotificationChannel, WebhookChannel, create_channel};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::Device;
use crate::config::NotificationsConfig;
use crate::types::{HostCheckResult, ReturnCode, ServiceCheckResult, ServiceState};

/// Broadcast to every configured channel
pub const NOTIFY_ALL: &str = "all";
/// Suppress notifications
pub const NOTIFY_NONE: &str = "none";

/// A message handed to the channels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub return_code: ReturnCode,
    pub message: String,
}

impl Notification {
    pub fn host(host: &str, alive: ReturnCode) -> Self {
        let status = if alive == ReturnCode::Ok { "Up" } else { "Down" };
        Self {
            host: host.to_string(),
            service: None,
            return_code: alive,
            message: format!("{host} is {status}"),
        }
    }

    pub fn service(host: &str, service: &ServiceCheckResult) -> Self {
        Self {
            host: host.to_string(),
            service: Some(service.name.clone()),
            return_code: service.return_code,
            message: format!("{} on host {} is {}", service.name, host, service.return_code),
        }
    }
}

/// Routes host and service changes to notification channels
#[derive(Clone, Default)]
pub struct NotificationRouter {
    primary: Option<String>,
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationRouter {
    pub fn new(primary: impl Into<String>, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { primary: Some(primary.into()), channels }
    }

    /// Router that never sends anything
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_config(config: Option<&NotificationsConfig>) -> Self {
        let Some(config) = config else {
            return Self::disabled();
        };

        let channels = config.types.iter().filter_map(create_channel).collect();
        Self::new(config.primary.clone(), channels)
    }

    /// Channels for the most specific notifier setting available
    fn select(&self, overrides: &[Option<&str>]) -> Vec<Arc<dyn NotificationChannel>> {
        let notifier = overrides
            .iter()
            .flatten()
            .copied()
            .next()
            .or(self.primary.as_deref());

        match notifier {
            None | Some(NOTIFY_NONE) => Vec::new(),
            Some(NOTIFY_ALL) => self.channels.clone(),
            Some(name) => {
                let selected: Vec<_> =
                    self.channels.iter().filter(|c| c.name() == name).cloned().collect();
                if selected.is_empty() {
                    warn!(notifier = %name, "No notification channel configured with this name");
                }
                selected
            }
        }
    }

    /// Notify when the host went up or down, returns the number of channels used
    pub async fn notify_host_change(
        &self,
        device: &Device,
        old: Option<&HostCheckResult>,
        new: &HostCheckResult,
        now: DateTime<Utc>,
    ) -> usize {
        let Some(old) = old else {
            return 0;
        };
        if old.alive == new.alive {
            return 0;
        }
        if device.is_silenced(now) {
            debug!(host = %device.id, "Host is silenced, skipping host notification");
            return 0;
        }

        let channels = self.select(&[device.notifier.as_deref()]);
        self.send(&channels, Notification::host(&device.name, new.alive)).await
    }

    /// Notify on a confirmed service change, returns the number of channels used
    pub async fn notify_service_change(
        &self,
        device: &Device,
        old: Option<&ServiceCheckResult>,
        new: &ServiceCheckResult,
        now: DateTime<Utc>,
    ) -> usize {
        let Some(old) = old else {
            return 0;
        };

        let confirmed_change =
            old.return_code != new.return_code && new.state == ServiceState::Confirmed;
        let just_confirmed =
            old.state == ServiceState::Unconfirmed && new.state == ServiceState::Confirmed;
        if !(confirmed_change || just_confirmed) {
            return 0;
        }
        if device.is_silenced(now) {
            debug!(host = %device.id, service = %new.id, "Host is silenced, skipping service notification");
            return 0;
        }

        let channels = self.select(&[new.notifier.as_deref(), device.notifier.as_deref()]);
        self.send(&channels, Notification::service(&device.name, new)).await
    }

    async fn send(&self, channels: &[Arc<dyn NotificationChannel>], notification: Notification) -> usize {
        let sends = channels.iter().map(|channel| {
            let notification = &notification;
            async move {
                if let Err(e) = channel.send(notification).await {
                    warn!(channel = %channel.name(), "Failed to send notification: {e:#}");
                }
            }
        });
        join_all(sends).await;

        channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::device;
    use crate::types::ServiceCheckResult;
    use chrono::Duration;
    use std::sync::Mutex;

    /// Channel that remembers what it was asked to send
    struct Recorder {
        name: &'static str,
        fail: bool,
        sent: Mutex<Vec<Notification>>,
    }

    impl Recorder {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self { name, fail: false, sent: Mutex::new(Vec::new()) })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self { name, fail: true, sent: Mutex::new(Vec::new()) })
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl NotificationChannel for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail { anyhow::bail!("channel down") } else { Ok(()) }
        }
    }

    fn router(primary: &str, channels: &[Arc<Recorder>]) -> NotificationRouter {
        NotificationRouter::new(
            primary,
            channels.iter().map(|c| c.clone() as Arc<dyn NotificationChannel>).collect(),
        )
    }

    fn service(code: ReturnCode, state: ServiceState) -> ServiceCheckResult {
        let mut result = ServiceCheckResult::new("nas", "Disk", code, "");
        result.state = state;
        result
    }

    fn host(alive: ReturnCode) -> HostCheckResult {
        let now = Utc::now();
        HostCheckResult {
            id: "nas".to_string(),
            name: "nas".to_string(),
            address: "192.0.2.10".to_string(),
            type_id: "generic".to_string(),
            icon: "devices".to_string(),
            info: String::new(),
            management_page: None,
            interval: 5,
            silenced_until: None,
            services: Vec::new(),
            overall_status: alive,
            alive,
            last_check: now,
            next_check: now,
        }
    }

    #[tokio::test]
    async fn test_service_change_routing() {
        let log = Recorder::new("log");
        let webhook = Recorder::new("webhook");
        let router = router("log", &[log.clone(), webhook.clone()]);
        let nas = device("nas", "generic");
        let now = Utc::now();

        let old = service(ReturnCode::Ok, ServiceState::Confirmed);
        let new = service(ReturnCode::Critical, ServiceState::Confirmed);
        assert_eq!(router.notify_service_change(&nas, Some(&old), &new, now).await, 1);
        assert_eq!(log.count(), 1);
        assert_eq!(webhook.count(), 0);
        assert_eq!(log.sent.lock().unwrap()[0].message, "Disk on host nas is Critical");
    }

    #[tokio::test]
    async fn test_service_no_notification_cases() {
        let log = Recorder::new("log");
        let router = router("log", &[log.clone()]);
        let nas = device("nas", "generic");
        let now = Utc::now();

        // unconfirmed problem
        let old = service(ReturnCode::Ok, ServiceState::Confirmed);
        let new = service(ReturnCode::Warning, ServiceState::Unconfirmed);
        assert_eq!(router.notify_service_change(&nas, Some(&old), &new, now).await, 0);

        // nothing changed
        let new = service(ReturnCode::Ok, ServiceState::Confirmed);
        assert_eq!(router.notify_service_change(&nas, Some(&old), &new, now).await, 0);

        // first time the service is seen
        assert_eq!(router.notify_service_change(&nas, None, &new, now).await, 0);
        assert_eq!(log.count(), 0);
    }

    #[tokio::test]
    async fn test_service_confirmed_after_retries() {
        let log = Recorder::new("log");
        let router = router("log", &[log.clone()]);
        let nas = device("nas", "generic");

        let old = service(ReturnCode::Critical, ServiceState::Unconfirmed);
        let new = service(ReturnCode::Critical, ServiceState::Confirmed);
        assert_eq!(router.notify_service_change(&nas, Some(&old), &new, Utc::now()).await, 1);
    }

    #[tokio::test]
    async fn test_override_precedence() {
        let log = Recorder::new("log");
        let webhook = Recorder::new("webhook");
        let router = router("log", &[log.clone(), webhook.clone()]);
        let mut nas = device("nas", "generic");
        let now = Utc::now();
        let old = service(ReturnCode::Ok, ServiceState::Confirmed);

        // host override beats the primary channel
        nas.notifier = Some("webhook".to_string());
        let new = service(ReturnCode::Critical, ServiceState::Confirmed);
        router.notify_service_change(&nas, Some(&old), &new, now).await;
        assert_eq!((log.count(), webhook.count()), (0, 1));

        // service override beats the host
        let mut new = service(ReturnCode::Critical, ServiceState::Confirmed);
        new.notifier = Some("all".to_string());
        router.notify_service_change(&nas, Some(&old), &new, now).await;
        assert_eq!((log.count(), webhook.count()), (1, 2));

        new.notifier = Some("none".to_string());
        assert_eq!(router.notify_service_change(&nas, Some(&old), &new, now).await, 0);
    }

    #[tokio::test]
    async fn test_silenced_host_suppresses_everything() {
        let log = Recorder::new("log");
        let router = router("all", &[log.clone()]);
        let mut nas = device("nas", "generic");
        let now = Utc::now();
        nas.silenced_until = Some(now + Duration::minutes(10));

        let old = service(ReturnCode::Ok, ServiceState::Confirmed);
        let new = service(ReturnCode::Critical, ServiceState::Confirmed);
        assert_eq!(router.notify_service_change(&nas, Some(&old), &new, now).await, 0);
        assert_eq!(
            router
                .notify_host_change(&nas, Some(&host(ReturnCode::Ok)), &host(ReturnCode::Critical), now)
                .await,
            0
        );

        // silence expired
        let later = now + Duration::minutes(11);
        assert_eq!(router.notify_service_change(&nas, Some(&old), &new, later).await, 1);
    }

    #[tokio::test]
    async fn test_host_change_only_on_alive_flip() {
        let log = Recorder::new("log");
        let router = router("log", &[log.clone()]);
        let nas = device("nas", "generic");
        let now = Utc::now();

        let up = host(ReturnCode::Ok);
        let down = host(ReturnCode::Critical);
        assert_eq!(router.notify_host_change(&nas, Some(&up), &up, now).await, 0);
        assert_eq!(router.notify_host_change(&nas, None, &down, now).await, 0);
        assert_eq!(router.notify_host_change(&nas, Some(&up), &down, now).await, 1);
        assert_eq!(log.sent.lock().unwrap()[0].message, "nas is Down");
        assert_eq!(router.notify_host_change(&nas, Some(&down), &up, now).await, 1);
        assert_eq!(log.sent.lock().unwrap()[1].message, "nas is Up");
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_stop_others() {
        let broken = Recorder::failing("webhook");
        let log = Recorder::new("log");
        let router = router("all", &[broken.clone(), log.clone()]);
        let nas = device("nas", "generic");

        let old = service(ReturnCode::Ok, ServiceState::Confirmed);
        let new = service(ReturnCode::Warning, ServiceState::Confirmed);
        assert_eq!(router.notify_service_change(&nas, Some(&old), &new, Utc::now()).await, 2);
        assert_eq!(broken.count(), 1);
        assert_eq!(log.count(), 1);
    }

    #[tokio::test]
    async fn test_disabled_router() {
        let router = NotificationRouter::disabled();
        let nas = device("nas", "generic");
        let old = service(ReturnCode::Ok, ServiceState::Confirmed);
        let new = service(ReturnCode::Warning, ServiceState::Confirmed);
        assert_eq!(router.notify_service_change(&nas, Some(&old), &new, Utc::now()).await, 0);
    }
}
