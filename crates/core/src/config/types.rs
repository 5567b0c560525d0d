use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub executables: ExecutablesConfig,
}

/// Status server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8440
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Capacity of the channel feeding the history writer.
    #[serde(default = "default_history_buffer")]
    pub history_buffer: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            history_buffer: default_history_buffer(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("corral.db")
}

fn default_history_buffer() -> usize {
    1000
}

/// Event dispatch and working directory settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Number of event queue workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Root of the per-site and per-glidein working directories.
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,
    /// Address handed to remote jobs as CORRAL_SERVER.
    #[serde(default = "default_service_url")]
    pub service_url: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            working_directory: default_working_directory(),
            service_url: default_service_url(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_working_directory() -> PathBuf {
    PathBuf::from("var")
}

fn default_service_url() -> String {
    "localhost:8440".to_string()
}

/// Condor scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Exported as CONDOR_CONFIG to the submit and cancel commands.
    #[serde(default)]
    pub condor_config: Option<PathBuf>,
    #[serde(default = "default_submit_command")]
    pub submit_command: String,
    #[serde(default = "default_cancel_command")]
    pub cancel_command: String,
    /// How often job logs are polled for new records.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            condor_config: None,
            submit_command: default_submit_command(),
            cancel_command: default_cancel_command(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_submit_command() -> String {
    "condor_submit".to_string()
}

fn default_cancel_command() -> String {
    "condor_rm".to_string()
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

/// Scripts and files staged to remote sites.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutablesConfig {
    #[serde(default = "default_install")]
    pub install: String,
    #[serde(default = "default_uninstall")]
    pub uninstall: String,
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default = "default_run")]
    pub run: String,
    /// Condor config used by glideins that don't supply their own.
    #[serde(default = "default_glidein_condor_config")]
    pub glidein_condor_config: String,
    /// Replica location service passed to the installer.
    #[serde(default)]
    pub rls: Option<String>,
    /// Package mapper passed to the installer.
    #[serde(default)]
    pub mapper: Option<String>,
}

impl Default for ExecutablesConfig {
    fn default() -> Self {
        Self {
            install: default_install(),
            uninstall: default_uninstall(),
            start: default_start(),
            run: default_run(),
            glidein_condor_config: default_glidein_condor_config(),
            rls: None,
            mapper: None,
        }
    }
}

fn default_install() -> String {
    "share/corral/glidein_install".to_string()
}

fn default_uninstall() -> String {
    "share/corral/glidein_uninstall".to_string()
}

fn default_start() -> String {
    "share/corral/glidein_start".to_string()
}

fn default_run() -> String {
    "share/corral/glidein_run".to_string()
}

fn default_glidein_condor_config() -> String {
    "share/corral/glidein_condor_config".to_string()
}
