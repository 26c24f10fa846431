//! Lens module
//!
//! Lenses combine business logic with output formatting so the same
//! operations can back the CLI or be used as a library.
//!
//! | Lens | Purpose |
//! |------|---------|
//! | `RouteViewLens` | parse the looking-glass snapshot into observed next hops |
//! | `ComplianceLens` | diff observed next hops against intent and render alerts |
//!
//! Supporting modules:
//! - `intent`: loading and validating the intent file
//! - `names`: display names for ASNs and prefixes
//! - `slack`: forwarding rendered reports to Slack
//! - `utils`: the shared [`utils::OutputFormat`]
//!
//! # Usage
//!
//! ```rust,ignore
//! use route_check::lens::compliance::{ComplianceArgs, ComplianceLens};
//! use route_check::lens::routeview::RouteViewLens;
//!
//! let route_view = RouteViewLens::new(&cache, 64500);
//! let lens = ComplianceLens::new(&names);
//! let report = lens.check(&route_view, &ComplianceArgs::new(64500), "route_intent.yaml")?;
//! println!("{}", lens.alert_line(&report.statuses));
//! ```

pub mod utils;

pub mod compliance;
pub mod intent;
pub mod names;
pub mod routeview;
pub mod slack;
