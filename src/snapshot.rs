//! File-based cache for the looking-glass snapshot
//!
//! A single JSON file holds the most recent looking-glass response together
//! with its metadata. The fetch timestamp is embedded in the file, so the
//! snapshot age survives copies and does not depend on file mtimes.
//!
//! # Freshness
//!
//! A snapshot younger than the TTL (default 8 hours) is reused. Older, missing
//! or undecodable snapshots trigger a fetch. When the fetch fails, a stale
//! snapshot for the same AS is returned as a [`SnapshotOrigin::StaleFallback`]
//! and its `fetched_at` keeps its true value.
//!
//! # Writes
//!
//! New snapshots are written to a temporary file in the cache directory and
//! renamed over the old one, so a concurrent reader sees either the old or the
//! new snapshot, never a truncated file.

use chrono::{DateTime, Utc};
use chrono_humanize::HumanTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::RouteCheckError;
use crate::lookingglass::LookingGlassFetcher;

/// Default TTL for the looking-glass snapshot (8 hours)
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Metadata stored alongside the raw looking-glass text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// AS number the looking glass was queried for
    #[serde(rename = "query")]
    pub asn: u32,
    /// Looking-glass endpoint identifier
    pub source: String,
    /// When the looking glass answered
    pub fetched_at: DateTime<Utc>,
    /// Size of the raw text in bytes
    pub bytes: usize,
}

/// Cached looking-glass response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub raw_text: String,
}

impl Snapshot {
    pub fn new(asn: u32, source: &str, raw_text: String, fetched_at: DateTime<Utc>) -> Self {
        Self {
            meta: SnapshotMeta {
                asn,
                source: source.to_string(),
                fetched_at,
                bytes: raw_text.len(),
            },
            raw_text,
        }
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.meta.fetched_at
    }

    /// Age at `now`; snapshots stamped in the future count as brand new
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.meta.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    pub fn is_fresh_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age_at(now) < ttl
    }

    /// Human-readable age, e.g. "3 hours ago"
    pub fn humanized_age(&self) -> String {
        HumanTime::from(self.meta.fetched_at).to_string()
    }
}

/// How a snapshot was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SnapshotOrigin {
    /// Fresh cached copy, no network access
    Cache,
    /// Fetched from the looking glass during this call
    Fetched,
    /// The fetch failed; a stale cached copy is returned instead
    StaleFallback { reason: String },
}

/// A snapshot together with how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSnapshot {
    pub snapshot: Snapshot,
    pub origin: SnapshotOrigin,
}

impl LoadedSnapshot {
    pub fn is_stale_fallback(&self) -> bool {
        matches!(self.origin, SnapshotOrigin::StaleFallback { .. })
    }

    /// One-line description for report footers
    pub fn describe(&self) -> String {
        let snapshot = &self.snapshot;
        let base = format!(
            "Snapshot of AS{} from {} fetched {} ({})",
            snapshot.meta.asn,
            snapshot.meta.source,
            snapshot.humanized_age(),
            snapshot.fetched_at().format("%Y-%m-%d %H:%M:%S UTC"),
        );
        match &self.origin {
            SnapshotOrigin::Cache => format!("{}, cached", base),
            SnapshotOrigin::Fetched => format!("{}, refreshed", base),
            SnapshotOrigin::StaleFallback { reason } => {
                format!("{}, STALE: refresh failed: {}", base, reason)
            }
        }
    }
}

/// State of the snapshot file, for `snapshot status`
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStatus {
    pub path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fresh: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub ttl_secs: u64,
}

/// Snapshot cache manager
pub struct SnapshotCache {
    path: PathBuf,
    ttl: Duration,
    fetcher: Box<dyn LookingGlassFetcher>,
}

impl SnapshotCache {
    /// Create a cache stored at `path`, refreshed through `fetcher`
    pub fn new(
        path: impl Into<PathBuf>,
        ttl: Duration,
        fetcher: Box<dyn LookingGlassFetcher>,
    ) -> Self {
        Self {
            path: path.into(),
            ttl,
            fetcher,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a snapshot for `asn`, fetching when the cached one is missing,
    /// stale, for another AS, or when `force_refresh` is set
    pub fn get_snapshot(
        &self,
        asn: u32,
        force_refresh: bool,
    ) -> Result<LoadedSnapshot, RouteCheckError> {
        let cached = self.load().filter(|s| {
            if s.meta.asn != asn {
                info!(
                    "cached snapshot is for AS{}, not AS{}; ignoring it",
                    s.meta.asn, asn
                );
            }
            s.meta.asn == asn
        });

        if let Some(snapshot) = &cached {
            if !force_refresh && snapshot.is_fresh_at(self.ttl, Utc::now()) {
                info!(
                    "using cached snapshot for AS{} fetched {}",
                    asn,
                    snapshot.humanized_age()
                );
                return Ok(LoadedSnapshot {
                    snapshot: snapshot.clone(),
                    origin: SnapshotOrigin::Cache,
                });
            }
        }

        match self.fetcher.fetch(asn) {
            Ok(raw_text) => {
                let snapshot = Snapshot::new(asn, &self.fetcher.source(), raw_text, Utc::now());
                if let Err(e) = self.store(&snapshot) {
                    warn!("fetched snapshot was not cached: {}", e);
                }
                Ok(LoadedSnapshot {
                    snapshot,
                    origin: SnapshotOrigin::Fetched,
                })
            }
            Err(e) => match cached {
                Some(snapshot) => {
                    warn!(
                        "looking glass refresh failed ({}); falling back to stale snapshot fetched {}",
                        e,
                        snapshot.humanized_age()
                    );
                    Ok(LoadedSnapshot {
                        snapshot,
                        origin: SnapshotOrigin::StaleFallback {
                            reason: e.to_string(),
                        },
                    })
                }
                None => Err(RouteCheckError::SnapshotUnavailable {
                    asn,
                    path: self.path.clone(),
                    source: e,
                }),
            },
        }
    }

    /// Load the cached snapshot; an unreadable file counts as no snapshot
    pub fn load(&self) -> Option<Snapshot> {
        if !self.path.exists() {
            return None;
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!("unable to read snapshot file {:?}: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str::<Snapshot>(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(
                    "ignoring undecodable snapshot file {:?}: {}",
                    self.path, e
                );
                None
            }
        }
    }

    /// Atomically replace the snapshot file
    pub fn store(&self, snapshot: &Snapshot) -> Result<(), RouteCheckError> {
        let cache_err = |message: String| RouteCheckError::Cache {
            path: self.path.clone(),
            message,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| cache_err(format!("failed to create cache directory: {}", e)))?;

        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| cache_err(format!("failed to serialize snapshot: {}", e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| cache_err(format!("failed to create temporary file: {}", e)))?;
        tmp.write_all(content.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| cache_err(format!("failed to write temporary file: {}", e)))?;
        tmp.persist(&self.path)
            .map_err(|e| cache_err(format!("failed to move snapshot into place: {}", e.error)))?;

        info!(
            "cached {} bytes of looking-glass output for AS{} to {:?}",
            snapshot.meta.bytes, snapshot.meta.asn, self.path
        );

        Ok(())
    }

    /// Remove the snapshot file, if any
    pub fn clear(&self) -> Result<bool, RouteCheckError> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path).map_err(|e| RouteCheckError::Cache {
            path: self.path.clone(),
            message: format!("failed to remove snapshot: {}", e),
        })?;
        Ok(true)
    }

    pub fn status(&self) -> SnapshotStatus {
        let now = Utc::now();
        let snapshot = self.load();
        let size_bytes = fs::metadata(&self.path).ok().map(|m| m.len());

        SnapshotStatus {
            path: self.path.display().to_string(),
            exists: self.path.exists(),
            asn: snapshot.as_ref().map(|s| s.meta.asn),
            source: snapshot.as_ref().map(|s| s.meta.source.clone()),
            fetched_at: snapshot.as_ref().map(|s| s.fetched_at()),
            age_secs: snapshot.as_ref().map(|s| s.age_at(now).as_secs()),
            fresh: snapshot.as_ref().map(|s| s.is_fresh_at(self.ttl, now)),
            size_bytes,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}
