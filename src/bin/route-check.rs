use clap::{Parser, Subcommand};
use route_check::lens::utils::OutputFormat;
use route_check::RouteCheckConfig;
use tracing::Level;

mod commands;

use commands::observed::ObservedArgs;
use commands::show::ShowArgs;
use commands::snapshot::SnapshotCommands;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.route-check/route-check.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long, global = true)]
    debug: bool,

    /// Output format: table, markdown, json, json-pretty, json-line, psv, alert
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check your prefixes against the intent file.
    Show(ShowArgs),

    /// Show next-hop ASNs seen on route-views, without intent.
    Observed(ObservedArgs),

    /// Inspect or manage the cached looking-glass snapshot.
    Snapshot {
        #[clap(subcommand)]
        command: SnapshotCommands,
    },

    /// Show the effective configuration.
    Config,
}

fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match RouteCheckConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    if cli.debug {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(Level::DEBUG)
            .init();
    }

    match cli.command {
        Commands::Show(args) => {
            let code = commands::show::run(&config, args, cli.format);
            std::process::exit(code);
        }
        Commands::Observed(args) => commands::observed::run(&config, args, cli.format),
        Commands::Snapshot { command } => commands::snapshot::run(&config, command, cli.format),
        Commands::Config => commands::config::run(&config, cli.config.as_deref(), cli.format),
    }
}
