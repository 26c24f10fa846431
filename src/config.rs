use anyhow::{anyhow, Result};
use config::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lens::names::Translations;
use crate::lookingglass::LookingGlassMethod;

/// Default snapshot TTL: 8 hours
pub const DEFAULT_SNAPSHOT_TTL_SECS: u64 = 8 * 60 * 60;

/// Public route-views looking glass
pub const DEFAULT_LG_HOST: &str = "route-views.routeviews.org";
pub const DEFAULT_LG_PORT: u16 = 23;
pub const DEFAULT_LG_USERNAME: &str = "rviews";

/// Per-operation network timeout (connect, read, write)
pub const DEFAULT_LG_TIMEOUT_SECS: u64 = 30;

/// Upper bound for a complete looking-glass session
pub const DEFAULT_LG_COMMAND_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_INTENT_FILE: &str = "route_intent.yaml";

pub const SNAPSHOT_FILE_NAME: &str = "route_view_snapshot.json";

pub struct RouteCheckConfig {
    /// Path to the directory to hold route-check's data
    pub data_dir: String,

    /// TTL for the looking-glass snapshot in seconds (default: 8 hours)
    pub snapshot_ttl_secs: u64,

    /// Default intent file used when none is given on the command line
    pub intent_file: String,

    /// How to reach the looking glass
    pub lg_method: LookingGlassMethod,
    pub lg_host: String,
    pub lg_port: u16,
    pub lg_username: String,
    pub lg_timeout_secs: u64,
    pub lg_command_timeout_secs: u64,

    /// URL template for the HTTP looking glass, `{asn}` is substituted
    pub lg_http_url: Option<String>,

    /// AS number to display name
    pub asn_names: HashMap<String, String>,

    /// Prefix to display name
    pub prefix_names: HashMap<String, String>,
}

const EMPTY_CONFIG: &str = r#"### route-check configuration file

### directory for cached data used by route-check
# data_dir = "~/.route-check"

### looking-glass snapshot TTL (in seconds)
# snapshot_ttl_secs = 28800         # 8 hours

### intent file used when --intent-file is not given
# intent_file = "route_intent.yaml"

### looking glass settings
# lg_method = "telnet"              # telnet or http
# lg_host = "route-views.routeviews.org"
# lg_port = 23
# lg_username = "rviews"
# lg_timeout_secs = 30
# lg_command_timeout_secs = 120
# lg_http_url = "https://lg.example.net/bgp?regexp=_{asn}_"

### display names, used for output only
# [asn_names]
# 3257 = "GTT"
# 6939 = "HURRICANE"
#
# [prefix_names]
# "1.2.3.0/24" = "MY_SITE"
"#;

/// Shape of the configuration file and `ROUTE_CHECK_*` environment variables
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    data_dir: Option<String>,
    snapshot_ttl_secs: Option<u64>,
    intent_file: Option<String>,
    lg_method: Option<String>,
    lg_host: Option<String>,
    lg_port: Option<u16>,
    lg_username: Option<String>,
    lg_timeout_secs: Option<u64>,
    lg_command_timeout_secs: Option<u64>,
    lg_http_url: Option<String>,
    #[serde(default)]
    asn_names: HashMap<String, String>,
    #[serde(default)]
    prefix_names: HashMap<String, String>,
}

impl Default for RouteCheckConfig {
    fn default() -> Self {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());

        Self {
            data_dir: format!("{}/.route-check", home_dir),
            snapshot_ttl_secs: DEFAULT_SNAPSHOT_TTL_SECS,
            intent_file: DEFAULT_INTENT_FILE.to_string(),
            lg_method: LookingGlassMethod::Telnet,
            lg_host: DEFAULT_LG_HOST.to_string(),
            lg_port: DEFAULT_LG_PORT,
            lg_username: DEFAULT_LG_USERNAME.to_string(),
            lg_timeout_secs: DEFAULT_LG_TIMEOUT_SECS,
            lg_command_timeout_secs: DEFAULT_LG_COMMAND_TIMEOUT_SECS,
            lg_http_url: None,
            asn_names: HashMap::new(),
            prefix_names: HashMap::new(),
        }
    }
}

impl RouteCheckConfig {
    /// Function to create and initialize a new configuration
    pub fn new(path: &Option<String>) -> Result<RouteCheckConfig> {
        let mut builder = Config::builder();

        // By default use $HOME/.route-check/route-check.toml as the configuration file path
        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();

        let route_check_dir = format!("{}/.route-check", home_dir.as_str());

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(route_check_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create route-check directory: {}", e))?;
                let p = Self::config_file_path();
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // Add in settings from the environment (with a prefix of ROUTE_CHECK)
        // E.g., `ROUTE_CHECK_DATA_DIR=/var/lib/route-check route-check show 64500`
        builder = builder.add_source(config::Environment::with_prefix("ROUTE_CHECK"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let raw = settings
            .try_deserialize::<RawConfig>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_raw(raw, &route_check_dir)
    }

    fn from_raw(raw: RawConfig, default_dir: &str) -> Result<RouteCheckConfig> {
        let data_dir = match raw.data_dir {
            Some(p) => expand_home(&p),
            None => default_dir.to_string(),
        };

        let lg_method = match raw.lg_method {
            Some(m) => m.parse::<LookingGlassMethod>().map_err(|e| anyhow!(e))?,
            None => LookingGlassMethod::Telnet,
        };

        if lg_method == LookingGlassMethod::Http && raw.lg_http_url.is_none() {
            return Err(anyhow!(
                "lg_method is \"http\" but lg_http_url is not set in the configuration"
            ));
        }

        Ok(RouteCheckConfig {
            data_dir,
            snapshot_ttl_secs: raw.snapshot_ttl_secs.unwrap_or(DEFAULT_SNAPSHOT_TTL_SECS),
            intent_file: raw
                .intent_file
                .unwrap_or_else(|| DEFAULT_INTENT_FILE.to_string()),
            lg_method,
            lg_host: raw.lg_host.unwrap_or_else(|| DEFAULT_LG_HOST.to_string()),
            lg_port: raw.lg_port.unwrap_or(DEFAULT_LG_PORT),
            lg_username: raw
                .lg_username
                .unwrap_or_else(|| DEFAULT_LG_USERNAME.to_string()),
            lg_timeout_secs: raw.lg_timeout_secs.unwrap_or(DEFAULT_LG_TIMEOUT_SECS),
            lg_command_timeout_secs: raw
                .lg_command_timeout_secs
                .unwrap_or(DEFAULT_LG_COMMAND_TIMEOUT_SECS),
            lg_http_url: raw.lg_http_url,
            asn_names: raw.asn_names,
            prefix_names: raw.prefix_names,
        })
    }

    /// Get the cache directory path
    pub fn cache_dir(&self) -> String {
        format!("{}/cache", self.data_dir.trim_end_matches('/'))
    }

    /// Get the path to the looking-glass snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(self.cache_dir()).join(SNAPSHOT_FILE_NAME)
    }

    /// Get snapshot TTL as Duration
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    pub fn lg_timeout(&self) -> Duration {
        Duration::from_secs(self.lg_timeout_secs)
    }

    pub fn lg_command_timeout(&self) -> Duration {
        Duration::from_secs(self.lg_command_timeout_secs)
    }

    /// Build the display-name tables
    pub fn translations(&self) -> Result<Translations> {
        Translations::from_tables(&self.asn_names, &self.prefix_names)
    }

    /// Looking-glass endpoint in human-readable form
    pub fn lg_endpoint(&self) -> String {
        match self.lg_method {
            LookingGlassMethod::Telnet => format!("telnet://{}:{}", self.lg_host, self.lg_port),
            LookingGlassMethod::Http => self.lg_http_url.clone().unwrap_or_default(),
        }
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let lines = vec![
            format!("Data Directory:     {}", self.data_dir),
            format!("Snapshot Path:      {}", self.snapshot_path().display()),
            format!("Snapshot TTL:       {} seconds", self.snapshot_ttl_secs),
            format!("Intent File:        {}", self.intent_file),
            format!("Looking Glass:      {}", self.lg_endpoint()),
            format!(
                "LG Timeouts:        {}s per operation, {}s per session",
                self.lg_timeout_secs, self.lg_command_timeout_secs
            ),
            format!("AS Names:           {}", self.asn_names.len()),
            format!("Prefix Names:       {}", self.prefix_names.len()),
        ];

        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.route-check/route-check.toml", home_dir)
    }
}

/// Serializable view of the effective configuration
#[derive(Debug, Serialize, Clone)]
pub struct ConfigInfo {
    pub config_file: String,
    pub data_dir: String,
    pub snapshot_path: String,
    pub snapshot_ttl_secs: u64,
    pub intent_file: String,
    pub looking_glass: String,
    pub lg_timeout_secs: u64,
    pub lg_command_timeout_secs: u64,
    pub asn_names: usize,
    pub prefix_names: usize,
}

impl From<&RouteCheckConfig> for ConfigInfo {
    fn from(config: &RouteCheckConfig) -> Self {
        ConfigInfo {
            config_file: RouteCheckConfig::config_file_path(),
            data_dir: config.data_dir.clone(),
            snapshot_path: config.snapshot_path().display().to_string(),
            snapshot_ttl_secs: config.snapshot_ttl_secs,
            intent_file: config.intent_file.clone(),
            looking_glass: config.lg_endpoint(),
            lg_timeout_secs: config.lg_timeout_secs,
            lg_command_timeout_secs: config.lg_command_timeout_secs,
            asn_names: config.asn_names.len(),
            prefix_names: config.prefix_names.len(),
        }
    }
}

fn expand_home(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest).to_string_lossy().to_string(),
            None => path.to_string(),
        },
        None => path.to_string(),
    }
}
