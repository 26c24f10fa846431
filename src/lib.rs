#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! route-check - audit upstream reachability of your prefixes
//!
//! route-check queries the route-views looking glass for paths through your
//! AS, extracts the next-hop AS (the neighbor right before your AS) for every
//! prefix, and compares the result against an intent file declaring which
//! upstreams should carry each prefix.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `cli` | CLI binary with spinners and log output | `clap`, `indicatif`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! - **[`lookingglass`]**: telnet and HTTP clients returning raw `show ip bgp` text
//! - **[`snapshot`]**: TTL-based cache of the looking-glass response with stale fallback
//! - **[`lens`]**: parsing, intent loading, compliance evaluation and rendering
//! - **[`config`]**: configuration management
//! - **[`error`]**: error kinds surfaced by the pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use route_check::{RouteCheckConfig, SnapshotCache};
//! use route_check::lens::compliance::{ComplianceArgs, ComplianceLens};
//! use route_check::lens::routeview::RouteViewLens;
//!
//! let config = RouteCheckConfig::new(&None)?;
//! let fetcher = route_check::lookingglass::from_config(&config)?;
//! let cache = SnapshotCache::new(config.snapshot_path(), config.snapshot_ttl(), fetcher);
//! let names = config.translations()?;
//!
//! let route_view = RouteViewLens::new(&cache, 64500);
//! let lens = ComplianceLens::new(&names);
//! let report = lens.check(&route_view, &ComplianceArgs::new(64500), &config.intent_file)?;
//! std::process::exit(report.level.exit_code());
//! ```

pub mod config;
pub mod error;
pub mod lens;
pub mod lookingglass;
pub mod snapshot;

pub use config::{ConfigInfo, RouteCheckConfig};
pub use error::{FetchError, IntentLoadError, ParseError, RouteCheckError};
pub use lens::compliance::{
    AlertLevel, ComplianceEngine, ComplianceReport, ComplianceSummary, PrefixState, PrefixStatus,
};
pub use lens::intent::{Intent, IntentStore};
pub use lens::names::Translations;
pub use lens::routeview::{ObservedRoutes, RouteViewParser};
pub use lens::utils::OutputFormat;
pub use lookingglass::{LookingGlassFetcher, LookingGlassMethod};
pub use snapshot::{LoadedSnapshot, Snapshot, SnapshotCache, SnapshotOrigin};
