use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// GroupTask collaboration server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "grouptask-server", version, about = "GroupTask collaboration server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "GROUPTASK_PORT", default_value = "4000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "GROUPTASK_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./grouptask.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "GROUPTASK_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for the SQLite database
    #[arg(long, env = "GROUPTASK_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Seconds between WebSocket liveness probes
    #[arg(long, env = "GROUPTASK_PING_INTERVAL_SECS", default_value = "10")]
    pub ping_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            config: "./grouptask.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            ping_interval_secs: 10,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (GROUPTASK_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("GROUPTASK_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# GroupTask Collaboration Server Configuration
# Place this file at ./grouptask.toml or specify with --config <path>
# All settings can be overridden via environment variables (GROUPTASK_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"

# Seconds between WebSocket liveness probes. A connection that misses two
# consecutive probes is evicted.
# ping_interval_secs = 10
"#
    .to_string()
}
