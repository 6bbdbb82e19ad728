use chrono::Utc;
use libsql::Connection;
use tracing::info;

use super::StoreResult;

/// Schema version, increment when making schema changes
const SCHEMA_VERSION: i32 = 3;

/// Bring the database schema up to date
pub async fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Host snapshots, services and metadata").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Performance data time series").await?;
    }

    if current_version < 3 {
        run_migration_v3(conn).await?;
        record_migration(conn, 3, "Owning host of performance samples").await?;
    }

    info!("Database migrations completed (now at version {})", SCHEMA_VERSION);
    Ok(())
}

async fn get_current_version(conn: &Connection) -> StoreResult<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    match rows.next().await? {
        Some(row) => Ok(row.get::<Option<i32>>(0)?.unwrap_or(0)),
        None => Ok(0),
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, Utc::now().timestamp(), description],
    )
    .await?;

    info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Host snapshots are stored whole as JSON, services get their own rows for querying
async fn run_migration_v1(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS hosts (
            id TEXT PRIMARY KEY,
            snapshot TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS services (
            id TEXT NOT NULL,
            host_id TEXT NOT NULL,
            return_code INTEGER NOT NULL,
            snapshot TEXT NOT NULL,
            PRIMARY KEY (host_id, id)
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS service_tags (
            host_id TEXT NOT NULL,
            service_id TEXT NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (host_id, service_id, tag)
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_services_return_code ON services(return_code)", ())
        .await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_service_tags_tag ON service_tags(tag)", ()).await?;

    Ok(())
}

async fn run_migration_v2(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS perf_samples (
            metric_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            value REAL NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_perf_samples_metric_time ON perf_samples(metric_id, timestamp)",
        (),
    )
    .await?;

    Ok(())
}

/// Samples written before v3 have no host and only leave through retention
async fn run_migration_v3(conn: &Connection) -> StoreResult<()> {
    conn.execute("ALTER TABLE perf_samples ADD COLUMN host_id TEXT", ()).await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_perf_samples_host ON perf_samples(host_id)", ())
        .await?;

    Ok(())
}
