use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use tracing::debug;

use super::migrations::run_migrations;
use super::pool::{self, LibsqlPool, PooledConnection};
use super::{HistoryStore, MetricSample, StoreResult, retention_cutoff};
use crate::error::StoreError;
use crate::types::{HostCheckResult, ReturnCode, ServiceCheckResult};

const LAST_CHECK_KEY: &str = "last_check";

/// Store backed by a local libsql database file
pub struct SqlStore {
    pool: LibsqlPool,
}

impl SqlStore {
    /// Open (or create) the database at `path` and run migrations
    pub async fn open(path: &str) -> StoreResult<Self> {
        let pool = pool::open(path).await?;
        let store = Self { pool };

        let conn = store.get_conn().await?;
        run_migrations(&conn).await?;

        Ok(store)
    }

    async fn get_conn(&self) -> StoreResult<PooledConnection> {
        self.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))
    }

    async fn query_services(
        &self,
        sql: &str,
        param: impl libsql::params::IntoParams,
    ) -> StoreResult<Vec<ServiceCheckResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, param).await?;
        let mut services = Vec::new();

        while let Some(row) = rows.next().await? {
            let snapshot: String = row.get(0)?;
            services.push(serde_json::from_str(&snapshot)?);
        }

        Ok(services)
    }
}

async fn delete_host(conn: &Connection, id: &str) -> StoreResult<()> {
    conn.execute("DELETE FROM service_tags WHERE host_id = ?", params![id]).await?;
    conn.execute("DELETE FROM services WHERE host_id = ?", params![id]).await?;
    conn.execute("DELETE FROM hosts WHERE id = ?", params![id]).await?;
    Ok(())
}

#[async_trait]
impl HistoryStore for SqlStore {
    async fn get_host(&self, id: &str) -> StoreResult<Option<HostCheckResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT snapshot FROM hosts WHERE id = ?", params![id]).await?;

        match rows.next().await? {
            Some(row) => {
                let snapshot: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&snapshot)?))
            }
            None => Ok(None),
        }
    }

    async fn save_host(&self, id: &str, host: &HostCheckResult) -> StoreResult<()> {
        let snapshot = serde_json::to_string(host)?;
        let timestamp = host.last_check.timestamp_millis();

        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        delete_host(&tx, id).await?;
        tx.execute(
            "INSERT INTO hosts (id, snapshot, updated_at) VALUES (?, ?, ?)",
            params![id, snapshot, timestamp],
        )
        .await?;

        for service in &host.services {
            tx.execute(
                "INSERT OR REPLACE INTO services (id, host_id, return_code, snapshot) VALUES (?, ?, ?, ?)",
                params![
                    service.id.as_str(),
                    id,
                    u8::from(service.return_code) as i64,
                    serde_json::to_string(service)?
                ],
            )
            .await?;

            for tag in &service.tags {
                tx.execute(
                    "INSERT OR IGNORE INTO service_tags (host_id, service_id, tag) VALUES (?, ?, ?)",
                    params![id, service.id.as_str(), tag.as_str()],
                )
                .await?;
            }

            for metric in &service.perf_data {
                tx.execute(
                    "INSERT INTO perf_samples (host_id, metric_id, timestamp, value) VALUES (?, ?, ?, ?)",
                    params![id, metric.id.as_str(), timestamp, metric.value],
                )
                .await?;
            }
        }

        let pruned = tx
            .execute(
                "DELETE FROM perf_samples WHERE timestamp < ?",
                params![retention_cutoff(host.last_check).timestamp_millis()],
            )
            .await?;

        tx.commit().await?;

        if pruned > 0 {
            debug!(host = %id, pruned, "Pruned expired performance samples");
        }
        Ok(())
    }

    async fn set_hosts(&self, ids: &[String]) -> StoreResult<()> {
        let conn = self.get_conn().await?;

        let mut stored = Vec::new();
        let mut rows = conn.query("SELECT id FROM hosts", ()).await?;
        while let Some(row) = rows.next().await? {
            stored.push(row.get::<String>(0)?);
        }

        for id in stored.iter().filter(|id| !ids.contains(*id)) {
            debug!(host = %id, "Removing stale host from history");
            delete_host(&conn, id).await?;
            conn.execute("DELETE FROM perf_samples WHERE host_id = ?", params![id.as_str()]).await?;
        }

        Ok(())
    }

    async fn list_hosts(&self) -> StoreResult<Vec<HostCheckResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT snapshot FROM hosts ORDER BY id", ()).await?;
        let mut hosts = Vec::new();

        while let Some(row) = rows.next().await? {
            let snapshot: String = row.get(0)?;
            hosts.push(serde_json::from_str(&snapshot)?);
        }

        Ok(hosts)
    }

    async fn get_last_check(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let conn = self.get_conn().await?;
        let mut rows =
            conn.query("SELECT value FROM meta WHERE key = ?", params![LAST_CHECK_KEY]).await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let value: String = row.get(0)?;

        Ok(value.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis))
    }

    async fn save_last_check(&self, at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
            params![LAST_CHECK_KEY, at.timestamp_millis().to_string()],
        )
        .await?;
        Ok(())
    }

    async fn get_service(
        &self,
        host_id: &str,
        service_id: &str,
    ) -> StoreResult<Option<ServiceCheckResult>> {
        let mut services = self
            .query_services(
                "SELECT snapshot FROM services WHERE host_id = ? AND id = ?",
                params![host_id, service_id],
            )
            .await?;

        Ok(services.pop())
    }

    async fn services_by_status(&self, codes: &[ReturnCode]) -> StoreResult<Vec<ServiceCheckResult>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        // ",1,2," matched against ",{return_code},"
        let wanted = codes.iter().fold(String::from(","), |mut acc, code| {
            acc.push_str(&u8::from(*code).to_string());
            acc.push(',');
            acc
        });

        self.query_services(
            "SELECT snapshot FROM services
             WHERE instr(?, ',' || return_code || ',') > 0
             ORDER BY host_id, id",
            params![wanted],
        )
        .await
    }

    async fn services_with_tag(&self, tag: &str) -> StoreResult<Vec<ServiceCheckResult>> {
        self.query_services(
            "SELECT s.snapshot FROM services s
             JOIN service_tags t ON t.host_id = s.host_id AND t.service_id = s.id
             WHERE t.tag = ?
             ORDER BY s.host_id, s.id",
            params![tag],
        )
        .await
    }

    async fn metric_history(
        &self,
        metric_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<MetricSample>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT timestamp, value FROM perf_samples
                 WHERE metric_id = ? AND timestamp >= ? AND timestamp <= ?
                 ORDER BY timestamp",
                params![metric_id, start.timestamp_millis(), end.timestamp_millis()],
            )
            .await?;

        let mut samples = Vec::new();
        while let Some(row) = rows.next().await? {
            let Some(timestamp) = DateTime::from_timestamp_millis(row.get::<i64>(0)?) else {
                continue;
            };
            samples.push(MetricSample { timestamp, value: row.get::<f64>(1)? });
        }

        Ok(samples)
    }
}
