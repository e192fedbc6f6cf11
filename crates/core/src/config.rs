//! Application configuration.
//!
//! Layered with the `config` crate: `config/default` < `config/{CELLBOX_ENV}`
//! < `config/local` < an explicit file < `CELLBOX__*` environment variables.
//! Only loading lives here; the sandbox crate validates the values.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub sandbox: SandboxSettings,
    pub logging: LoggingConfig,
}

/// Raw sandbox settings as supplied by the operator.
#[derive(Debug, Deserialize, Clone)]
pub struct SandboxSettings {
    pub image: String,
    pub memory_limit_bytes: u64,
    pub cpu_share: f64,
    pub network_enabled: bool,
    pub work_dir: String,
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
    /// Maximum number of processes inside the container.
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,
    #[serde(default = "default_pull_missing_images")]
    pub pull_missing_images: bool,
    #[serde(default)]
    pub bindings: Vec<BindingSettings>,
    /// Tool kinds exposed through the registry (`shell`, `read_file`, `write_file`).
    #[serde(default = "default_tools")]
    pub tools: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BindingSettings {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

fn default_pids_limit() -> i64 {
    256
}

fn default_pull_missing_images() -> bool {
    true
}

fn default_tools() -> Vec<String> {
    vec!["shell".into(), "read_file".into(), "write_file".into()]
}

impl AppConfig {
    /// Load configuration from the standard `config/` directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load configuration, layering `explicit` on top of the standard files.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env = std::env::var("CELLBOX_ENV").unwrap_or_else(|_| "development".into());
        let defaults = AppConfig::default();

        let mut builder = Config::builder()
            .set_default("sandbox.image", defaults.sandbox.image)?
            .set_default(
                "sandbox.memory_limit_bytes",
                defaults.sandbox.memory_limit_bytes,
            )?
            .set_default("sandbox.cpu_share", defaults.sandbox.cpu_share)?
            .set_default("sandbox.network_enabled", defaults.sandbox.network_enabled)?
            .set_default("sandbox.work_dir", defaults.sandbox.work_dir)?
            .set_default(
                "sandbox.default_timeout_secs",
                defaults.sandbox.default_timeout_secs,
            )?
            .set_default("sandbox.max_timeout_secs", defaults.sandbox.max_timeout_secs)?
            .set_default("logging.filter", defaults.logging.filter)?
            .set_default("logging.json", defaults.logging.json)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path));
        }

        // Map CELLBOX__SANDBOX__IMAGE=alpine to sandbox.image
        let s = builder
            .add_source(Environment::with_prefix("CELLBOX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxSettings {
                image: "cellbox-sandbox:latest".into(),
                memory_limit_bytes: 512 * 1024 * 1024,
                cpu_share: 1.0,
                network_enabled: false,
                work_dir: "/workspace".into(),
                default_timeout_secs: 30,
                max_timeout_secs: 300,
                pids_limit: default_pids_limit(),
                pull_missing_images: true,
                bindings: Vec::new(),
                tools: default_tools(),
            },
            logging: LoggingConfig {
                filter: "info,cellbox=debug".into(),
                json: false,
            },
        }
    }
}
