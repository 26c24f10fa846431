use clap::Args;
use route_check::lens::routeview::RouteViewLens;
use route_check::lens::utils::OutputFormat;
use route_check::RouteCheckConfig;
use std::path::PathBuf;

use super::{snapshot_cache, with_spinner};

/// Arguments for the Observed command
#[derive(Args)]
pub struct ObservedArgs {
    /// AS number of your organization
    #[clap(value_name = "ASN")]
    pub asn: u32,

    /// Force a refresh of the looking-glass snapshot
    #[clap(short = 'R', long)]
    pub refresh: bool,

    /// Parse saved `show ip bgp` output instead of querying the looking glass
    #[clap(long, value_name = "FILE", conflicts_with = "refresh")]
    pub file: Option<PathBuf>,
}

pub fn run(config: &RouteCheckConfig, args: ObservedArgs, output_format: OutputFormat) {
    let ObservedArgs { asn, refresh, file } = args;

    let names = match config.translations() {
        Ok(n) => n,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    let cache = match snapshot_cache(config, None) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };
    let lens = RouteViewLens::new(&cache, asn);

    let observed = match file {
        Some(path) => {
            let text = match std::fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    eprintln!("ERROR: unable to read {}: {}", path.display(), e);
                    std::process::exit(1);
                }
            };
            lens.observe_text(&text)
        }
        None => with_spinner(
            format!("Loading route-views snapshot for AS{}...", asn),
            || lens.observe(refresh),
        )
        .map(|view| {
            if view.snapshot.is_stale_fallback() || output_format.is_table() {
                eprintln!("{}", view.snapshot.describe());
            }
            view.observed
        }),
    };

    match observed {
        Ok(observed) => {
            println!("{}", lens.format_observed(&observed, &names, output_format));
            if observed.stats.skipped > 0 {
                eprintln!(
                    "Warning: skipped {} malformed route entries",
                    observed.stats.skipped
                );
            }
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }
}
