//! Compliance lens
//!
//! Compares the next-hop ASNs observed on the looking glass against the
//! operator's intent, classifying every prefix as OK, DEGRADED, DOWN or
//! UNKNOWN, and renders the result as a table, JSON or a Nagios alert line.

mod types;

pub use types::{
    AlertLevel, ComplianceReport, ComplianceSummary, PrefixState, PrefixStatus, PrefixStatusRow,
    SnapshotInfo,
};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::RouteCheckError;
use crate::lens::intent::{Intent, IntentStore};
use crate::lens::names::Translations;
use crate::lens::routeview::{ObservedRoutes, RouteViewLens};
use crate::lens::utils::{join_asns, truncate_name, OutputFormat, DEFAULT_NAME_MAX_LEN};
use crate::snapshot::LoadedSnapshot;

// =============================================================================
// Engine
// =============================================================================

/// Pure intent vs. observation diff
pub struct ComplianceEngine;

impl ComplianceEngine {
    /// One status per prefix in either input, in numeric CIDR order
    pub fn evaluate(intent: &Intent, observed: &ObservedRoutes) -> Vec<PrefixStatus> {
        let prefixes: BTreeSet<&IpNet> = intent.prefixes().chain(observed.prefixes()).collect();

        prefixes
            .into_iter()
            .map(|prefix| {
                let expected = intent.expected(prefix).map(|e| e.to_vec());
                let seen = observed.next_hops(prefix);
                classify(*prefix, expected, seen)
            })
            .collect()
    }
}

fn classify(
    prefix: IpNet,
    expected: Option<Vec<u32>>,
    seen: Option<&BTreeSet<u32>>,
) -> PrefixStatus {
    let observed = seen.cloned().unwrap_or_default();

    let Some(expected) = expected else {
        return PrefixStatus {
            prefix,
            expected: vec![],
            unexpected_upstreams: observed.clone(),
            missing_upstreams: BTreeSet::new(),
            observed,
            state: PrefixState::Unknown,
        };
    };

    let expected_set: BTreeSet<u32> = expected.iter().copied().collect();
    let missing: BTreeSet<u32> = expected_set.difference(&observed).copied().collect();
    let unexpected: BTreeSet<u32> = observed.difference(&expected_set).copied().collect();

    let state = if missing.is_empty() {
        PrefixState::Ok
    } else if expected_set.is_disjoint(&observed) {
        PrefixState::Down
    } else {
        PrefixState::Degraded
    };

    PrefixStatus {
        prefix,
        expected,
        observed,
        missing_upstreams: missing,
        unexpected_upstreams: unexpected,
        state,
    }
}

// =============================================================================
// Args
// =============================================================================

/// Arguments for a compliance check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::Args))]
pub struct ComplianceArgs {
    /// AS number of your organization
    #[cfg_attr(feature = "cli", clap(value_name = "ASN"))]
    pub asn: u32,

    /// Intent file (YAML or JSON), defaults to the configured intent file
    #[cfg_attr(feature = "cli", clap(short = 'I', long))]
    #[serde(default)]
    pub intent_file: Option<PathBuf>,

    /// Force a refresh of the looking-glass snapshot
    #[cfg_attr(feature = "cli", clap(short = 'R', long))]
    #[serde(default)]
    pub refresh: bool,
}

impl ComplianceArgs {
    pub fn new(asn: u32) -> Self {
        Self {
            asn,
            ..Default::default()
        }
    }
}

// =============================================================================
// Lens
// =============================================================================

pub struct ComplianceLens<'a> {
    names: &'a Translations,
}

impl<'a> ComplianceLens<'a> {
    pub fn new(names: &'a Translations) -> Self {
        Self { names }
    }

    /// Load intent, obtain the observed view and evaluate them
    ///
    /// `default_intent` is used when `args.intent_file` is unset.
    pub fn check(
        &self,
        route_view: &RouteViewLens,
        args: &ComplianceArgs,
        default_intent: &str,
    ) -> Result<ComplianceReport, RouteCheckError> {
        let intent_path = args
            .intent_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_intent));
        // load intent before touching the network
        let intent = IntentStore::load(&intent_path)?;
        let view = route_view.observe(args.refresh)?;
        Ok(self.report(args.asn, &intent, &view.observed, Some(&view.snapshot)))
    }

    pub fn report(
        &self,
        asn: u32,
        intent: &Intent,
        observed: &ObservedRoutes,
        snapshot: Option<&LoadedSnapshot>,
    ) -> ComplianceReport {
        let statuses = ComplianceEngine::evaluate(intent, observed);
        let summary = ComplianceSummary::from_statuses(&statuses);
        ComplianceReport {
            asn,
            level: summary.alert_level(),
            summary,
            snapshot: snapshot.map(|s| SnapshotInfo {
                source: s.snapshot.meta.source.clone(),
                fetched_at: s.snapshot.fetched_at(),
                age_secs: s.snapshot.age().as_secs(),
                stale_fallback: s.is_stale_fallback(),
                description: s.describe(),
            }),
            statuses,
        }
    }

    /// Nagios-compatible single line, e.g.
    /// `[WARNING] Prefix 1.2.3.0/24 is missing upstream 6461 (seen via 3356)`
    pub fn alert_line(&self, statuses: &[PrefixStatus]) -> String {
        let level = ComplianceSummary::from_statuses(statuses).alert_level();
        let clauses: Vec<String> = statuses
            .iter()
            .filter(|s| !s.is_ok())
            .map(|s| self.alert_clause(s))
            .collect();

        if clauses.is_empty() {
            format!("[{}] No alerts!", level)
        } else {
            format!("[{}] {}", level, clauses.join("; "))
        }
    }

    fn alert_clause(&self, status: &PrefixStatus) -> String {
        let prefix = self.names.prefix_label(&status.prefix);
        match status.state {
            PrefixState::Down => format!(
                "Prefix {} is DOWN, expected via {}",
                prefix,
                self.names.asn_list(&status.expected)
            ),
            PrefixState::Degraded => {
                let plural = if status.missing_upstreams.len() > 1 { "s" } else { "" };
                format!(
                    "Prefix {} is missing upstream{} {} (seen via {})",
                    prefix,
                    plural,
                    self.names.asn_list(&status.missing_upstreams),
                    self.names.asn_list(status.observed.intersection(
                        &status.expected.iter().copied().collect::<BTreeSet<u32>>()
                    ))
                )
            }
            PrefixState::Unknown => format!("Prefix {} not found in intent file", prefix),
            PrefixState::Ok => format!("Prefix {} is OK", prefix),
        }
    }

    pub fn rows(&self, statuses: &[PrefixStatus]) -> Vec<PrefixStatusRow> {
        let dash = |s: String| if s.is_empty() { "-".to_string() } else { s };
        statuses
            .iter()
            .map(|s| PrefixStatusRow {
                prefix: s.prefix.to_string(),
                name: truncate_name(
                    self.names.prefix_name(&s.prefix).unwrap_or("-"),
                    DEFAULT_NAME_MAX_LEN,
                ),
                state: s.state.to_string(),
                expected: dash(self.names.asn_list(&s.expected)),
                observed: dash(self.names.asn_list(&s.observed)),
                missing: dash(self.names.asn_list(&s.missing_upstreams)),
                unexpected: dash(self.names.asn_list(&s.unexpected_upstreams)),
            })
            .collect()
    }

    /// Render a report in the requested format
    ///
    /// Table formats get a summary and snapshot footer; JSON formats carry
    /// the same information as fields.
    pub fn format_report(&self, report: &ComplianceReport, format: OutputFormat) -> String {
        match format {
            OutputFormat::Alert => {
                let mut line = self.alert_line(&report.statuses);
                if let Some(snapshot) = report.snapshot.as_ref().filter(|s| s.stale_fallback) {
                    line.push_str(&format!(
                        " (using stale snapshot from {})",
                        snapshot.fetched_at.format("%Y-%m-%d %H:%M UTC")
                    ));
                }
                line
            }
            OutputFormat::Json => serde_json::to_string(report).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::JsonLine => report
                .statuses
                .iter()
                .filter_map(|s| serde_json::to_string(s).ok())
                .collect::<Vec<_>>()
                .join("\n"),
            OutputFormat::Psv => {
                let mut lines =
                    vec!["prefix|state|expected|observed|missing|unexpected".to_string()];
                for s in &report.statuses {
                    lines.push(format!(
                        "{}|{}|{}|{}|{}|{}",
                        s.prefix,
                        s.state,
                        join_asns(&s.expected),
                        join_asns(&s.observed),
                        join_asns(&s.missing_upstreams),
                        join_asns(&s.unexpected_upstreams)
                    ));
                }
                lines.join("\n")
            }
            OutputFormat::Table | OutputFormat::Markdown => {
                let mut out = self.format_table(&report.statuses, format);
                out.push_str(&format!("\n{}", report.summary));
                if let Some(snapshot) = &report.snapshot {
                    out.push_str(&format!("\n{}", snapshot.description));
                }
                out
            }
        }
    }

    #[cfg(feature = "display")]
    fn format_table(&self, statuses: &[PrefixStatus], format: OutputFormat) -> String {
        use tabled::settings::Style;
        use tabled::Table;

        let rows = self.rows(statuses);
        match format {
            OutputFormat::Markdown => Table::new(rows).with(Style::markdown()).to_string(),
            _ => Table::new(rows).with(Style::rounded()).to_string(),
        }
    }

    #[cfg(not(feature = "display"))]
    fn format_table(&self, statuses: &[PrefixStatus], _format: OutputFormat) -> String {
        self.rows(statuses)
            .into_iter()
            .map(|r| {
                format!(
                    "{} {} {} expected {} observed {}",
                    r.prefix, r.name, r.state, r.expected, r.observed
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn net(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    fn intent(entries: &[(&str, &[u32])]) -> Intent {
        entries.iter().map(|(p, asns)| (net(p), asns.to_vec())).collect()
    }

    fn observed(entries: &[(&str, &[u32])]) -> ObservedRoutes {
        entries
            .iter()
            .map(|(p, asns)| (net(p), asns.iter().copied().collect::<BTreeSet<u32>>()))
            .collect()
    }

    fn set(asns: &[u32]) -> BTreeSet<u32> {
        asns.iter().copied().collect()
    }

    #[test]
    fn test_partial_upstream_loss_is_degraded() {
        let statuses = ComplianceEngine::evaluate(
            &intent(&[("1.2.3.0/24", &[3356, 6461])]),
            &observed(&[("1.2.3.0/24", &[3356])]),
        );
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, PrefixState::Degraded);
        assert_eq!(statuses[0].missing_upstreams, set(&[6461]));
        assert!(statuses[0].unexpected_upstreams.is_empty());
    }

    #[test]
    fn test_absent_prefix_is_down() {
        let statuses = ComplianceEngine::evaluate(
            &intent(&[("1.2.3.0/24", &[3356, 6461])]),
            &ObservedRoutes::default(),
        );
        assert_eq!(statuses[0].state, PrefixState::Down);
        assert_eq!(statuses[0].missing_upstreams, set(&[3356, 6461]));
        assert!(statuses[0].observed.is_empty());
    }

    #[test]
    fn test_seen_without_next_hop_is_down() {
        // route-views carries the prefix, but no path has an AS before ours
        let statuses = ComplianceEngine::evaluate(
            &intent(&[("1.2.3.0/24", &[3356, 6461])]),
            &observed(&[("1.2.3.0/24", &[])]),
        );
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, PrefixState::Down);
        assert!(statuses[0].observed.is_empty());
        assert_eq!(statuses[0].missing_upstreams, set(&[3356, 6461]));
        assert!(statuses[0].unexpected_upstreams.is_empty());
    }

    #[test]
    fn test_extra_upstream_is_still_ok() {
        let statuses = ComplianceEngine::evaluate(
            &intent(&[("1.2.4.0/24", &[174])]),
            &observed(&[("1.2.4.0/24", &[174, 209])]),
        );
        assert_eq!(statuses[0].state, PrefixState::Ok);
        assert_eq!(statuses[0].unexpected_upstreams, set(&[209]));
    }

    #[test]
    fn test_wrong_upstreams_only_is_down() {
        let statuses = ComplianceEngine::evaluate(
            &intent(&[("1.2.4.0/24", &[174])]),
            &observed(&[("1.2.4.0/24", &[209]), ("1.2.5.0/24", &[])]),
        );
        assert_eq!(statuses[0].state, PrefixState::Down);
        assert_eq!(statuses[0].unexpected_upstreams, set(&[209]));
        // seen without any next hop and not in intent
        assert_eq!(statuses[1].state, PrefixState::Unknown);
        assert!(statuses[1].unexpected_upstreams.is_empty());
    }

    #[test]
    fn test_unknown_prefix() {
        let statuses = ComplianceEngine::evaluate(
            &intent(&[("1.2.3.0/24", &[3356])]),
            &observed(&[("1.2.3.0/24", &[3356]), ("198.51.100.0/24", &[3257])]),
        );
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[1].prefix, net("198.51.100.0/24"));
        assert_eq!(statuses[1].state, PrefixState::Unknown);
        assert!(statuses[1].expected.is_empty());
        assert_eq!(statuses[1].unexpected_upstreams, set(&[3257]));
    }

    #[test]
    fn test_union_order_and_determinism() {
        let i = intent(&[
            ("2001:db8::/32", &[3257]),
            ("10.0.0.0/8", &[174]),
            ("9.0.0.0/8", &[174]),
            ("10.0.0.0/16", &[174]),
        ]);
        let o = observed(&[("10.0.0.0/8", &[174]), ("100.64.0.0/10", &[3257])]);

        let statuses = ComplianceEngine::evaluate(&i, &o);
        let prefixes: Vec<String> = statuses.iter().map(|s| s.prefix.to_string()).collect();
        assert_eq!(
            prefixes,
            vec![
                "9.0.0.0/8",
                "10.0.0.0/8",
                "10.0.0.0/16",
                "100.64.0.0/10",
                "2001:db8::/32"
            ]
        );
        assert_eq!(statuses, ComplianceEngine::evaluate(&i, &o));
    }

    #[test]
    fn test_expected_order_is_kept() {
        let statuses = ComplianceEngine::evaluate(
            &intent(&[("1.2.3.0/24", &[6461, 3356])]),
            &observed(&[("1.2.3.0/24", &[3356, 6461])]),
        );
        assert_eq!(statuses[0].expected, vec![6461, 3356]);
        assert_eq!(statuses[0].state, PrefixState::Ok);
    }

    #[test]
    fn test_summary_and_alert_level() {
        let statuses = ComplianceEngine::evaluate(
            &intent(&[("1.2.3.0/24", &[3356]), ("1.2.4.0/24", &[174, 209])]),
            &observed(&[("1.2.3.0/24", &[3356]), ("1.2.4.0/24", &[209])]),
        );
        let summary = ComplianceSummary::from_statuses(&statuses);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.degraded, 1);
        assert_eq!(summary.alert_level(), AlertLevel::Warning);
        assert_eq!(summary.alert_level().exit_code(), 1);

        let summary = ComplianceSummary {
            total: 3,
            ok: 1,
            degraded: 1,
            down: 1,
            unknown: 0,
        };
        assert_eq!(summary.alert_level(), AlertLevel::Critical);
        assert_eq!(ComplianceSummary::default().alert_level(), AlertLevel::Ok);
    }

    #[test]
    fn test_alert_line() {
        let names = Translations::new()
            .with_asn(6461, "ZAYO")
            .with_prefix(net("1.2.3.0/24"), "MY_SITE");
        let lens = ComplianceLens::new(&names);

        let ok = ComplianceEngine::evaluate(
            &intent(&[("1.2.3.0/24", &[3356])]),
            &observed(&[("1.2.3.0/24", &[3356])]),
        );
        assert_eq!(lens.alert_line(&ok), "[OK] No alerts!");

        let mixed = ComplianceEngine::evaluate(
            &intent(&[("1.2.3.0/24", &[3356, 6461]), ("1.2.4.0/24", &[174])]),
            &observed(&[("1.2.3.0/24", &[3356]), ("8.8.8.0/24", &[15169])]),
        );
        assert_eq!(
            lens.alert_line(&mixed),
            "[CRITICAL] Prefix 1.2.3.0/24 (MY_SITE) is missing upstream 6461 (ZAYO) (seen via 3356); \
             Prefix 1.2.4.0/24 is DOWN, expected via 174; \
             Prefix 8.8.8.0/24 not found in intent file"
        );
    }

    #[test]
    fn test_format_report() {
        let names = Translations::new();
        let lens = ComplianceLens::new(&names);
        let report = lens.report(
            64500,
            &intent(&[("1.2.3.0/24", &[3356, 6461])]),
            &observed(&[("1.2.3.0/24", &[3356])]),
            None,
        );
        assert_eq!(report.level, AlertLevel::Warning);

        let psv = lens.format_report(&report, OutputFormat::Psv);
        assert_eq!(
            psv,
            "prefix|state|expected|observed|missing|unexpected\n1.2.3.0/24|DEGRADED|3356, 6461|3356|6461|"
        );

        let json: serde_json::Value =
            serde_json::from_str(&lens.format_report(&report, OutputFormat::Json)).unwrap();
        assert_eq!(json["level"], "WARNING");
        assert_eq!(json["summary"]["degraded"], 1);
        assert_eq!(json["statuses"][0]["state"], "DEGRADED");
        assert_eq!(json["statuses"][0]["missing_upstreams"], serde_json::json!([6461]));
        assert!(json.get("snapshot").is_none());

        let table = lens.format_report(&report, OutputFormat::Table);
        assert!(table.contains("DEGRADED"));
        assert!(table.ends_with("1 prefixes: 0 OK, 1 DEGRADED, 0 DOWN, 0 UNKNOWN"));
    }

    #[test]
    fn test_every_prefix_once() {
        let i = intent(&[("1.2.3.0/24", &[1]), ("1.2.4.0/24", &[2])]);
        let o = observed(&[("1.2.4.0/24", &[2]), ("1.2.5.0/24", &[3])]);
        let statuses = ComplianceEngine::evaluate(&i, &o);
        let counts: BTreeMap<IpNet, usize> = statuses.iter().fold(BTreeMap::new(), |mut m, s| {
            *m.entry(s.prefix).or_default() += 1;
            m
        });
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|c| *c == 1));
    }
}
