use clap::Subcommand;
use route_check::lens::utils::OutputFormat;
use route_check::snapshot::SnapshotStatus;
use route_check::RouteCheckConfig;

use super::{snapshot_cache, with_spinner};

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Show the cached looking-glass snapshot
    Status,

    /// Fetch a new snapshot now, ignoring the TTL
    Refresh {
        /// AS number of your organization
        #[clap(value_name = "ASN")]
        asn: u32,
    },

    /// Delete the cached snapshot
    Clear,
}

pub fn run(config: &RouteCheckConfig, commands: SnapshotCommands, output_format: OutputFormat) {
    let cache = match snapshot_cache(config, None) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    match commands {
        SnapshotCommands::Status => {
            let status = cache.status();
            if output_format.is_json() {
                let json = match output_format {
                    OutputFormat::JsonPretty => serde_json::to_string_pretty(&status),
                    _ => serde_json::to_string(&status),
                };
                match json {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("ERROR: Failed to serialize to JSON: {}", e),
                }
            } else {
                print_status(&status);
            }
        }
        SnapshotCommands::Refresh { asn } => {
            let loaded = with_spinner(
                format!("Querying {} for AS{}...", config.lg_endpoint(), asn),
                || cache.get_snapshot(asn, true),
            );
            match loaded {
                Ok(loaded) if loaded.is_stale_fallback() => {
                    eprintln!("ERROR: refresh failed, kept {}", loaded.describe());
                    std::process::exit(1);
                }
                Ok(loaded) => println!(
                    "{} ({} bytes)",
                    loaded.describe(),
                    loaded.snapshot.meta.bytes
                ),
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    std::process::exit(1);
                }
            }
        }
        SnapshotCommands::Clear => match cache.clear() {
            Ok(true) => println!("Removed {}", cache.path().display()),
            Ok(false) => println!("No snapshot at {}", cache.path().display()),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                std::process::exit(1);
            }
        },
    }
}

fn print_status(status: &SnapshotStatus) {
    println!("Snapshot");
    println!("========\n");
    println!("  Path:           {}", status.path);
    if !status.exists {
        println!("  Status:         not created");
        return;
    }
    match (status.asn, status.fetched_at) {
        (Some(asn), Some(fetched_at)) => {
            println!("  Query:          AS{}", asn);
            if let Some(source) = &status.source {
                println!("  Source:         {}", source);
            }
            println!(
                "  Fetched:        {} ({})",
                fetched_at.format("%Y-%m-%d %H:%M:%S UTC"),
                chrono_humanize::HumanTime::from(fetched_at)
            );
            println!(
                "  Status:         {}",
                if status.fresh == Some(true) {
                    "fresh"
                } else {
                    "stale"
                }
            );
        }
        _ => println!("  Status:         unreadable, will be replaced on next fetch"),
    }
    if let Some(size) = status.size_bytes {
        println!("  Size:           {} bytes", size);
    }
    println!(
        "  TTL:            {}",
        humantime::format_duration(std::time::Duration::from_secs(status.ttl_secs))
    );
}
