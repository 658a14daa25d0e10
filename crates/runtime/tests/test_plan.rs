use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use curalink_backend_runtime::{self, BackendServices};
use curalink_config::AppConfig;
use curalink_realtime::ConnectionRegistry;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.to_string_lossy())
}

fn build_config(database_url: String, max_connections: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = database_url;
    config.database.max_connections = max_connections;
    config
}

async fn initialise(config: &AppConfig) -> Result<BackendServices> {
    BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_runs_migrations() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/init.db");
    let config = build_config(sqlite_url(&db_path), 4);

    let services = initialise(&config).await?;
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('notifications', 'meeting_requests') ORDER BY name",
    )
    .fetch_all(&services.db_pool)
    .await?;

    assert_eq!(tables, vec!["meeting_requests", "notifications"]);
    assert!(db_path.exists());
    assert!(services.registry.is_accepting().await);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_rejects_non_sqlite_urls() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let target_dir = temp_dir.path().join("should_not_exist");
    let config = build_config(
        format!("postgres://{}/ignored.db", target_dir.to_string_lossy()),
        1,
    );

    let error = match BackendServices::initialise(&config).await {
        Ok(_) => panic!("expected initialisation to fail for a non-sqlite URL"),
        Err(error) => error,
    };
    assert!(!target_dir.exists());
    assert!(
        format!("{error:#}").contains("Database connection error"),
        "unexpected error: {error:#}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_releases_connections_and_closes_pool() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = build_config(sqlite_url(&temp_dir.path().join("drain.db")), 2);
    let services = initialise(&config).await?;

    let (tx, _rx) = ConnectionRegistry::channel(4);
    let registration = services.registry.register(7, tx).await?;

    services.shutdown().await;

    assert!(registration.is_closed());
    assert!(!services.registry.is_accepting().await);
    assert_eq!(services.registry.connected_count().await, 0);
    assert!(services.db_pool.is_closed());
    Ok(())
}

#[test]
fn telemetry_init_tracing_sets_global_subscriber() {
    curalink_backend_runtime::telemetry::init_tracing()
        .expect("first initialisation should succeed");

    let second = curalink_backend_runtime::telemetry::init_tracing();
    assert!(
        second.is_err(),
        "initialising telemetry twice should fail with global subscriber already set"
    );
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(not(unix), ignore = "requires Unix signal handling")]
async fn shutdown_signal_completes_on_ctrl_c_notification() -> Result<()> {
    let shutdown_task = tokio::spawn(async { curalink_backend_runtime::shutdown_signal().await });

    sleep(Duration::from_millis(50)).await;
    #[cfg(unix)]
    unsafe {
        libc::raise(libc::SIGINT);
    }

    timeout(Duration::from_secs(2), shutdown_task).await??;
    Ok(())
}
