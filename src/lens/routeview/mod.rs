//! Route-view lens
//!
//! Turns a looking-glass snapshot into the per-prefix set of next-hop ASNs
//! seen by route-views, and renders that observed view.

mod parser;

pub use parser::RouteViewParser;

use ipnet::IpNet;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::RouteCheckError;
use crate::lens::names::Translations;
use crate::lens::utils::{join_asns, truncate_name, OutputFormat, DEFAULT_NAME_MAX_LEN};
use crate::snapshot::{LoadedSnapshot, SnapshotCache};

#[cfg(feature = "display")]
use tabled::Tabled;

/// Counters collected while parsing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Valid route entries parsed
    pub entries: usize,
    /// Entries that looked like routes but could not be read
    pub skipped: usize,
    /// Well-formed entries without the valid flag
    pub ignored: usize,
}

/// Prefix to set of next-hop ASNs, as seen on the looking glass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObservedRoutes {
    pub routes: BTreeMap<IpNet, BTreeSet<u32>>,
    pub stats: ParseStats,
}

impl ObservedRoutes {
    pub fn next_hops(&self, prefix: &IpNet) -> Option<&BTreeSet<u32>> {
        self.routes.get(prefix)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &IpNet> {
        self.routes.keys()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<(IpNet, BTreeSet<u32>)> for ObservedRoutes {
    fn from_iter<T: IntoIterator<Item = (IpNet, BTreeSet<u32>)>>(iter: T) -> Self {
        ObservedRoutes {
            routes: iter.into_iter().map(|(p, hops)| (p.trunc(), hops)).collect(),
            stats: ParseStats::default(),
        }
    }
}

/// Observed routes together with the snapshot they were parsed from
#[derive(Debug, Clone)]
pub struct ObservedView {
    pub snapshot: LoadedSnapshot,
    pub observed: ObservedRoutes,
}

/// Table row for the observed view
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "display", derive(Tabled))]
pub struct ObservedRouteRow {
    #[cfg_attr(feature = "display", tabled(rename = "Prefix"))]
    pub prefix: String,
    #[cfg_attr(feature = "display", tabled(rename = "Name"))]
    pub name: String,
    #[cfg_attr(feature = "display", tabled(rename = "Next-hop AS"))]
    pub next_hops: String,
}

#[derive(Serialize)]
struct ObservedJson<'a> {
    prefix: &'a IpNet,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    next_hops: &'a BTreeSet<u32>,
}

/// Lens over the looking-glass snapshot for a single operator ASN
pub struct RouteViewLens<'a> {
    cache: &'a SnapshotCache,
    parser: RouteViewParser,
}

impl<'a> RouteViewLens<'a> {
    pub fn new(cache: &'a SnapshotCache, asn: u32) -> Self {
        Self {
            cache,
            parser: RouteViewParser::new(asn),
        }
    }

    pub fn asn(&self) -> u32 {
        self.parser.local_asn()
    }

    /// Load (or refresh) the snapshot and parse it
    pub fn observe(&self, force_refresh: bool) -> Result<ObservedView, RouteCheckError> {
        let snapshot = self.cache.get_snapshot(self.asn(), force_refresh)?;
        let observed = self.parser.parse(&snapshot.snapshot.raw_text)?;
        Ok(ObservedView { snapshot, observed })
    }

    /// Parse text obtained elsewhere, e.g. a saved looking-glass session
    pub fn observe_text(&self, raw_text: &str) -> Result<ObservedRoutes, RouteCheckError> {
        Ok(self.parser.parse(raw_text)?)
    }

    pub fn rows(&self, observed: &ObservedRoutes, names: &Translations) -> Vec<ObservedRouteRow> {
        observed
            .routes
            .iter()
            .map(|(prefix, hops)| ObservedRouteRow {
                prefix: prefix.to_string(),
                name: truncate_name(names.prefix_name(prefix).unwrap_or("-"), DEFAULT_NAME_MAX_LEN),
                next_hops: if hops.is_empty() {
                    "-".to_string()
                } else {
                    names.asn_list(hops)
                },
            })
            .collect()
    }

    /// Render the observed view; `alert` falls back to the table
    pub fn format_observed(
        &self,
        observed: &ObservedRoutes,
        names: &Translations,
        format: OutputFormat,
    ) -> String {
        let entries: Vec<ObservedJson> = observed
            .routes
            .iter()
            .map(|(prefix, hops)| ObservedJson {
                prefix,
                name: names.prefix_name(prefix),
                next_hops: hops,
            })
            .collect();

        match format {
            OutputFormat::Json => serde_json::to_string(&entries).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(&entries).unwrap_or_default(),
            OutputFormat::JsonLine => entries
                .iter()
                .filter_map(|e| serde_json::to_string(e).ok())
                .collect::<Vec<_>>()
                .join("\n"),
            OutputFormat::Psv => {
                let mut lines = vec!["prefix|name|next_hops".to_string()];
                for (prefix, hops) in &observed.routes {
                    lines.push(format!(
                        "{}|{}|{}",
                        prefix,
                        names.prefix_name(prefix).unwrap_or(""),
                        join_asns(hops)
                    ));
                }
                lines.join("\n")
            }
            OutputFormat::Table | OutputFormat::Markdown | OutputFormat::Alert => {
                self.format_table(observed, names, format)
            }
        }
    }

    #[cfg(feature = "display")]
    fn format_table(
        &self,
        observed: &ObservedRoutes,
        names: &Translations,
        format: OutputFormat,
    ) -> String {
        use tabled::settings::Style;
        use tabled::Table;

        let rows = self.rows(observed, names);
        match format {
            OutputFormat::Markdown => Table::new(rows).with(Style::markdown()).to_string(),
            _ => Table::new(rows).with(Style::rounded()).to_string(),
        }
    }

    #[cfg(not(feature = "display"))]
    fn format_table(
        &self,
        observed: &ObservedRoutes,
        names: &Translations,
        _format: OutputFormat,
    ) -> String {
        self.rows(observed, names)
            .into_iter()
            .map(|r| format!("{} {} via {}", r.prefix, r.name, r.next_hops))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
