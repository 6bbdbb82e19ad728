use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{HistoryStore, MetricSample, StoreResult, retention_cutoff};
use crate::types::{HostCheckResult, ReturnCode, ServiceCheckResult};

/// Store keeping snapshots in process memory, lost on restart
#[derive(Default)]
pub struct MemoryStore {
    hosts: RwLock<BTreeMap<String, HostCheckResult>>,
    /// Samples by host id, then metric id
    metrics: RwLock<HashMap<String, HashMap<String, Vec<MetricSample>>>>,
    last_check: RwLock<Option<DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn collect_services<F>(&self, keep: F) -> Vec<ServiceCheckResult>
    where
        F: Fn(&ServiceCheckResult) -> bool,
    {
        self.hosts
            .read()
            .await
            .values()
            .flat_map(|host| host.services.iter())
            .filter(|service| keep(service))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn get_host(&self, id: &str) -> StoreResult<Option<HostCheckResult>> {
        Ok(self.hosts.read().await.get(id).cloned())
    }

    async fn save_host(&self, id: &str, host: &HostCheckResult) -> StoreResult<()> {
        self.hosts.write().await.insert(id.to_string(), host.clone());

        let cutoff = retention_cutoff(host.last_check);
        let mut metrics = self.metrics.write().await;
        let host_metrics = metrics.entry(id.to_string()).or_default();
        for metric in host.services.iter().flat_map(|s| s.perf_data.iter()) {
            let samples = host_metrics.entry(metric.id.clone()).or_default();
            samples.push(MetricSample { timestamp: host.last_check, value: metric.value });
        }
        host_metrics.retain(|_, samples| {
            samples.retain(|sample| sample.timestamp >= cutoff);
            !samples.is_empty()
        });

        Ok(())
    }

    async fn set_hosts(&self, ids: &[String]) -> StoreResult<()> {
        self.hosts.write().await.retain(|id, _| ids.contains(id));
        self.metrics.write().await.retain(|id, _| ids.contains(id));
        Ok(())
    }

    async fn list_hosts(&self) -> StoreResult<Vec<HostCheckResult>> {
        Ok(self.hosts.read().await.values().cloned().collect())
    }

    async fn get_last_check(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(*self.last_check.read().await)
    }

    async fn save_last_check(&self, at: DateTime<Utc>) -> StoreResult<()> {
        *self.last_check.write().await = Some(at);
        Ok(())
    }

    async fn get_service(
        &self,
        host_id: &str,
        service_id: &str,
    ) -> StoreResult<Option<ServiceCheckResult>> {
        Ok(self
            .hosts
            .read()
            .await
            .get(host_id)
            .and_then(|host| host.service(service_id))
            .cloned())
    }

    async fn services_by_status(&self, codes: &[ReturnCode]) -> StoreResult<Vec<ServiceCheckResult>> {
        Ok(self.collect_services(|s| codes.contains(&s.return_code)).await)
    }

    async fn services_with_tag(&self, tag: &str) -> StoreResult<Vec<ServiceCheckResult>> {
        Ok(self.collect_services(|s| s.tags.iter().any(|t| t == tag)).await)
    }

    async fn metric_history(
        &self,
        metric_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<MetricSample>> {
        let metrics = self.metrics.read().await;
        let mut samples: Vec<MetricSample> = metrics
            .values()
            .filter_map(|host_metrics| host_metrics.get(metric_id))
            .flatten()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .copied()
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        Ok(samples)
    }
}
