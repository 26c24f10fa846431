use clap::Args;
use route_check::lens::compliance::{ComplianceArgs, ComplianceLens};
use route_check::lens::routeview::RouteViewLens;
use route_check::lens::slack::SlackNotifier;
use route_check::lens::utils::OutputFormat;
use route_check::RouteCheckConfig;
use std::time::Duration;

use super::{snapshot_cache, with_spinner};

/// Arguments for the Show command
#[derive(Args)]
pub struct ShowArgs {
    #[clap(flatten)]
    pub check: ComplianceArgs,

    /// Snapshot TTL for this run, e.g. "8h" or "30m"
    #[clap(long, value_parser = humantime::parse_duration)]
    pub ttl: Option<Duration>,

    /// Post the report to a Slack channel instead of printing it
    #[clap(short = 'S', long = "slack", value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// Only post to Slack when something is wrong
    #[clap(short = 'A', long)]
    pub alerts_only: bool,
}

/// Run the full check; returns the process exit code
pub fn run(config: &RouteCheckConfig, args: ShowArgs, output_format: OutputFormat) -> i32 {
    let ShowArgs {
        check,
        ttl,
        channel,
        alerts_only,
    } = args;

    let fail = |message: String| -> i32 {
        if output_format == OutputFormat::Alert {
            // errors count as CRITICAL in alert mode
            println!("[CRITICAL] route-check failed: {}", message);
            2
        } else {
            eprintln!("ERROR: {}", message);
            1
        }
    };

    let names = match config.translations() {
        Ok(n) => n,
        Err(e) => return fail(e.to_string()),
    };
    let cache = match snapshot_cache(config, ttl) {
        Ok(c) => c,
        Err(e) => return fail(e.to_string()),
    };

    let route_view = RouteViewLens::new(&cache, check.asn);
    let lens = ComplianceLens::new(&names);

    let report = match with_spinner(
        format!("Checking route-views for AS{}...", check.asn),
        || lens.check(&route_view, &check, &config.intent_file),
    ) {
        Ok(r) => r,
        Err(e) => return fail(e.to_string()),
    };

    if let Some(snapshot) = report.snapshot.as_ref().filter(|s| s.stale_fallback) {
        eprintln!("WARNING: {}", snapshot.description);
    }

    let content = lens.format_report(&report, output_format);

    match channel {
        Some(channel) => {
            if !SlackNotifier::should_post(report.level, alerts_only) {
                eprintln!("No alerts, nothing posted to {}", channel);
            } else {
                let posted = SlackNotifier::from_env().and_then(|s| s.post(&channel, &content));
                if let Err(e) = posted {
                    eprintln!("ERROR: {}", e);
                    return 1;
                }
                eprintln!("Report posted to {}", channel);
            }
        }
        None => println!("{}", content),
    }

    match output_format {
        OutputFormat::Alert => report.level.exit_code(),
        _ => 0,
    }
}
