/// History store abstraction
///
/// The scheduler reads the previous snapshot of every device from here and
/// saves the new one after each check cycle. Two backends are provided:
/// - `MemoryStore` keeps everything in process memory
/// - `SqlStore` persists to a local libsql database
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{HostCheckResult, ReturnCode, ServiceCheckResult};

/// Days of performance samples kept per metric
pub const METRIC_RETENTION_DAYS: i64 = 30;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One stored value of a performance metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Oldest sample timestamp still kept when saving at `now`
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(METRIC_RETENTION_DAYS)
}

/// Persistence contract used by the scheduler and the HTTP API
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Last saved snapshot of a host
    async fn get_host(&self, id: &str) -> StoreResult<Option<HostCheckResult>>;

    /// Save a host snapshot and record its metrics as time-series samples
    async fn save_host(&self, id: &str, host: &HostCheckResult) -> StoreResult<()>;

    /// Drop every stored host that is not in `ids`
    async fn set_hosts(&self, ids: &[String]) -> StoreResult<()>;

    async fn list_hosts(&self) -> StoreResult<Vec<HostCheckResult>>;

    async fn get_last_check(&self) -> StoreResult<Option<DateTime<Utc>>>;

    async fn save_last_check(&self, at: DateTime<Utc>) -> StoreResult<()>;

    /// Last result of one service on one host
    async fn get_service(
        &self,
        host_id: &str,
        service_id: &str,
    ) -> StoreResult<Option<ServiceCheckResult>>;

    /// Every stored service currently in one of `codes`
    async fn services_by_status(&self, codes: &[ReturnCode]) -> StoreResult<Vec<ServiceCheckResult>>;

    /// Every stored service carrying `tag`
    async fn services_with_tag(&self, tag: &str) -> StoreResult<Vec<ServiceCheckResult>>;

    /// Samples of a metric between `start` and `end`, oldest first
    async fn metric_history(
        &self,
        metric_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<MetricSample>>;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::types::{Metric, overall_status};

    pub(crate) fn service(host: &str, name: &str, code: ReturnCode, tags: &[&str]) -> ServiceCheckResult {
        let mut service = ServiceCheckResult::new(host, name, code, format!("{name} is {code}"));
        service.tags = tags.iter().map(|t| t.to_string()).collect();
        service
    }

    pub(crate) fn host(id: &str, at: DateTime<Utc>, services: Vec<ServiceCheckResult>) -> HostCheckResult {
        HostCheckResult {
            id: id.to_string(),
            name: id.to_string(),
            address: "192.0.2.1".to_string(),
            type_id: "generic".to_string(),
            icon: "devices".to_string(),
            info: String::new(),
            management_page: None,
            interval: 5,
            silenced_until: None,
            overall_status: overall_status(ReturnCode::Ok, &services),
            services,
            alive: ReturnCode::Ok,
            last_check: at,
            next_check: at + Duration::minutes(5),
        }
    }

    pub(crate) fn load(host: &str, value: f64) -> ServiceCheckResult {
        let mut service = service(host, "Load", ReturnCode::Ok, &[]);
        service.perf_data = vec![Metric {
            id: format!("{host}-load-load1"),
            label: "load1".to_string(),
            value,
            uom: None,
            warning: Some(4.0),
            critical: Some(8.0),
            min: None,
            max: None,
        }];
        service
    }

    /// Behaviour every store implementation must share
    pub(crate) async fn exercise(store: &dyn HistoryStore) {
        let now = Utc::now();

        assert!(store.get_host("nas").await.unwrap().is_none());
        assert!(store.get_last_check().await.unwrap().is_none());

        let nas = host(
            "nas",
            now,
            vec![
                service("nas", "Disk", ReturnCode::Critical, &["storage"]),
                service("nas", "Backup", ReturnCode::Warning, &["storage", "backup"]),
                load("nas", 0.5),
            ],
        );
        let router = host("router", now, vec![service("router", "Uplink", ReturnCode::Ok, &["network"])]);
        store.save_host("nas", &nas).await.unwrap();
        store.save_host("router", &router).await.unwrap();

        let stored = store.get_host("nas").await.unwrap().unwrap();
        assert_eq!(stored.services.len(), 3);
        assert_eq!(stored.overall_status, ReturnCode::Critical);

        let disk = store.get_service("nas", "nas-disk").await.unwrap().unwrap();
        assert_eq!(disk.return_code, ReturnCode::Critical);
        assert!(store.get_service("nas", "nas-missing").await.unwrap().is_none());
        assert!(store.get_service("ghost", "nas-disk").await.unwrap().is_none());

        let mut problems: Vec<String> = store
            .services_by_status(&[ReturnCode::Warning, ReturnCode::Critical])
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        problems.sort();
        assert_eq!(problems, vec!["nas-backup", "nas-disk"]);
        assert!(store.services_by_status(&[]).await.unwrap().is_empty());

        let storage = store.services_with_tag("storage").await.unwrap();
        assert_eq!(storage.len(), 2);
        assert_eq!(store.services_with_tag("network").await.unwrap()[0].id, "router-uplink");
        assert!(store.services_with_tag("nothing").await.unwrap().is_empty());

        // a second cycle adds another sample
        let later = now + Duration::minutes(5);
        store.save_host("nas", &host("nas", later, vec![load("nas", 1.5)])).await.unwrap();
        let samples = store
            .metric_history("nas-load-load1", now - Duration::minutes(1), later + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(samples.iter().map(|s| s.value).collect::<Vec<_>>(), vec![0.5, 1.5]);
        let samples = store
            .metric_history("nas-load-load1", later, later + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);

        // samples past the retention window are dropped
        let much_later = later + Duration::days(METRIC_RETENTION_DAYS + 1);
        store.save_host("nas", &host("nas", much_later, vec![load("nas", 2.5)])).await.unwrap();
        let samples = store
            .metric_history("nas-load-load1", now - Duration::days(1), much_later)
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 2.5);

        store.save_last_check(now).await.unwrap();
        let last = store.get_last_check().await.unwrap().unwrap();
        assert_eq!(last.timestamp_millis(), now.timestamp_millis());

        store.set_hosts(&["router".to_string()]).await.unwrap();
        assert!(store.get_host("nas").await.unwrap().is_none());
        let samples = store
            .metric_history("nas-load-load1", now - Duration::days(1), much_later)
            .await
            .unwrap();
        assert!(samples.is_empty());
        assert!(store.get_service("nas", "nas-disk").await.unwrap().is_none());
        let hosts = store.list_hosts().await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].id, "router");
    }
}
