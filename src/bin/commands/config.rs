use route_check::lens::utils::OutputFormat;
use route_check::{ConfigInfo, RouteCheckConfig};

pub fn run(config: &RouteCheckConfig, config_path: Option<&str>, output_format: OutputFormat) {
    let mut info = ConfigInfo::from(config);
    if let Some(path) = config_path {
        info.config_file = path.to_string();
    }

    if output_format.is_json() {
        let json = match output_format {
            OutputFormat::JsonPretty => serde_json::to_string_pretty(&info),
            _ => serde_json::to_string(&info),
        };
        match json {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing config info: {}", e),
        }
        return;
    }

    println!("route-check Configuration");
    println!("=========================\n");
    println!("Config File:        {}", info.config_file);
    println!("{}", config.summary());

    eprintln!();
    eprintln!("Tips:");
    eprintln!("  Use --format json for machine-readable output");
    eprintln!("  Set ROUTE_CHECK_<KEY> environment variables to override settings");
    eprintln!("  Edit {} to customize settings", info.config_file);
}
