use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "display")]
use tabled::Tabled;

/// Classification of a single prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrefixState {
    /// Every expected upstream carries the prefix
    Ok,
    /// Some, but not all, expected upstreams carry the prefix
    Degraded,
    /// No expected upstream carries the prefix
    Down,
    /// Observed on the looking glass but absent from the intent
    Unknown,
}

impl fmt::Display for PrefixState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixState::Ok => write!(f, "OK"),
            PrefixState::Degraded => write!(f, "DEGRADED"),
            PrefixState::Down => write!(f, "DOWN"),
            PrefixState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Intent vs. observation for one prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixStatus {
    pub prefix: IpNet,
    /// Expected upstreams in intent order, empty for UNKNOWN prefixes
    pub expected: Vec<u32>,
    pub observed: BTreeSet<u32>,
    pub missing_upstreams: BTreeSet<u32>,
    pub unexpected_upstreams: BTreeSet<u32>,
    pub state: PrefixState,
}

impl PrefixStatus {
    pub fn is_ok(&self) -> bool {
        self.state == PrefixState::Ok
    }
}

/// Nagios-style severity of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Ok,
    Warning,
    Critical,
}

impl AlertLevel {
    /// Plugin exit code: 0 OK, 1 WARNING, 2 CRITICAL
    pub fn exit_code(&self) -> i32 {
        match self {
            AlertLevel::Ok => 0,
            AlertLevel::Warning => 1,
            AlertLevel::Critical => 2,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Ok => write!(f, "OK"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Number of prefixes per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComplianceSummary {
    pub total: usize,
    pub ok: usize,
    pub degraded: usize,
    pub down: usize,
    pub unknown: usize,
}

impl ComplianceSummary {
    pub fn from_statuses(statuses: &[PrefixStatus]) -> Self {
        statuses
            .iter()
            .fold(ComplianceSummary::default(), |mut summary, status| {
                summary.total += 1;
                match status.state {
                    PrefixState::Ok => summary.ok += 1,
                    PrefixState::Degraded => summary.degraded += 1,
                    PrefixState::Down => summary.down += 1,
                    PrefixState::Unknown => summary.unknown += 1,
                }
                summary
            })
    }

    pub fn alert_level(&self) -> AlertLevel {
        if self.down > 0 {
            AlertLevel::Critical
        } else if self.degraded > 0 || self.unknown > 0 {
            AlertLevel::Warning
        } else {
            AlertLevel::Ok
        }
    }
}

impl fmt::Display for ComplianceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} prefixes: {} OK, {} DEGRADED, {} DOWN, {} UNKNOWN",
            self.total, self.ok, self.degraded, self.down, self.unknown
        )
    }
}

/// Where the observed data came from
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub age_secs: u64,
    pub stale_fallback: bool,
    /// Human-readable description for footers
    #[serde(skip)]
    pub description: String,
}

/// Full result of a compliance run
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub asn: u32,
    pub level: AlertLevel,
    pub summary: ComplianceSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotInfo>,
    pub statuses: Vec<PrefixStatus>,
}

/// Table row for a prefix status
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "display", derive(Tabled))]
pub struct PrefixStatusRow {
    #[cfg_attr(feature = "display", tabled(rename = "Prefix"))]
    pub prefix: String,
    #[cfg_attr(feature = "display", tabled(rename = "Name"))]
    pub name: String,
    #[cfg_attr(feature = "display", tabled(rename = "State"))]
    pub state: String,
    #[cfg_attr(feature = "display", tabled(rename = "Expected"))]
    pub expected: String,
    #[cfg_attr(feature = "display", tabled(rename = "Observed"))]
    pub observed: String,
    #[cfg_attr(feature = "display", tabled(rename = "Missing"))]
    pub missing: String,
    #[cfg_attr(feature = "display", tabled(rename = "Unexpected"))]
    pub unexpected: String,
}
