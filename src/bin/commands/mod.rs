pub mod config;
pub mod observed;
pub mod show;
pub mod snapshot;

use std::time::Duration;

use anyhow::Result;
use route_check::{RouteCheckConfig, SnapshotCache};

/// Snapshot cache wired to the configured looking glass
pub(crate) fn snapshot_cache(
    config: &RouteCheckConfig,
    ttl: Option<Duration>,
) -> Result<SnapshotCache> {
    let fetcher = route_check::lookingglass::from_config(config)?;
    Ok(SnapshotCache::new(
        config.snapshot_path(),
        ttl.unwrap_or_else(|| config.snapshot_ttl()),
        fetcher,
    ))
}

/// Run `f` with a spinner on stderr
pub(crate) fn with_spinner<T>(message: String, f: impl FnOnce() -> T) -> T {
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    let result = f();
    pb.finish_and_clear();
    result
}
