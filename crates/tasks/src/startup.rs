//! One-time startup work, coordinated across worker processes.
//!
//! Every process calls [`bootstrap`]; the advisory lock in
//! [`mosaic_db::repositories::StartupLock`] elects a single winner which
//! runs migrations, seeds the data-root directory layout, and rebuilds the
//! zoo cache. Losers skip the work and proceed directly to serving.

use std::collections::BTreeMap;

use sqlx::PgPool;

use mosaic_core::paths::{DataRoot, ZOO_DIRS};
use mosaic_core::zoo::{scan_zoo, ZooEntry};
use mosaic_db::repositories::StartupLock;

/// Cache file written under the data root by the startup winner.
pub const ZOO_CACHE_FILE: &str = "zoo_cache.json";

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("data root error: {0}")]
    Core(#[from] mosaic_core::error::CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("zoo cache serialisation failed: {0}")]
    Cache(#[from] serde_json::Error),
}

/// Run the one-time startup work if this process wins the election.
///
/// Returns `true` when this process performed the work, `false` when
/// another process holds (or already held) the lock.
pub async fn bootstrap(pool: &PgPool, data_root: &DataRoot) -> Result<bool, StartupError> {
    let Some(lock) = StartupLock::try_acquire(pool).await? else {
        tracing::info!("Another process is performing startup work, skipping");
        return Ok(false);
    };

    let result = run_startup_work(pool, data_root).await;
    // Release even when the work failed, so a healthy sibling can retry.
    if let Err(e) = lock.release().await {
        tracing::warn!(error = %e, "Failed to release startup lock");
    }
    result.map(|()| true)
}

async fn run_startup_work(pool: &PgPool, data_root: &DataRoot) -> Result<(), StartupError> {
    tracing::info!("Running startup work as the elected process");

    mosaic_db::migrate(pool).await?;

    seed_directories(data_root)?;
    let cache = build_zoo_cache(data_root)?;
    let total: usize = cache.values().map(Vec::len).sum();
    tracing::info!(items = total, "Zoo cache rebuilt");

    Ok(())
}

/// Create the data-root directory skeleton. Idempotent.
fn seed_directories(data_root: &DataRoot) -> Result<(), StartupError> {
    std::fs::create_dir_all(data_root.root().join("users"))?;
    for zoo in ZOO_DIRS {
        std::fs::create_dir_all(data_root.zoo_dir(zoo))?;
    }
    Ok(())
}

/// Scan every zoo directory and persist the combined cache file.
fn build_zoo_cache(
    data_root: &DataRoot,
) -> Result<BTreeMap<String, Vec<ZooEntry>>, StartupError> {
    let mut cache = BTreeMap::new();
    for zoo in ZOO_DIRS {
        let entries = scan_zoo(&data_root.zoo_dir(zoo))?;
        cache.insert(zoo.to_string(), entries);
    }
    let path = data_root.root().join(ZOO_CACHE_FILE);
    let json = serde_json::to_vec_pretty(&cache)?;
    std::fs::write(path, json)?;
    Ok(cache)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_and_cache_build_are_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let data_root = DataRoot::new(tmp.path());

        seed_directories(&data_root).unwrap();
        seed_directories(&data_root).unwrap();
        for zoo in ZOO_DIRS {
            assert!(data_root.zoo_dir(zoo).is_dir());
        }

        let item = data_root.zoo_dir("apps_zoo").join("repo/app");
        std::fs::create_dir_all(&item).unwrap();
        std::fs::write(item.join("description.yaml"), "name: app\n").unwrap();

        let cache = build_zoo_cache(&data_root).unwrap();
        assert_eq!(cache["apps_zoo"].len(), 1);
        assert!(cache["mcps_zoo"].is_empty());
        assert!(data_root.root().join(ZOO_CACHE_FILE).is_file());

        // Rebuilding overwrites rather than appending.
        let cache = build_zoo_cache(&data_root).unwrap();
        assert_eq!(cache["apps_zoo"].len(), 1);
    }
}
