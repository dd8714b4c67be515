//! Configuration management for study memos.
//!
//! Loads configuration from environment variables (and `.env`) covering:
//! - The remote catalog (Orthanc) connection
//! - The local backup tier location and layout
//! - Identifier resolution strategy
//! - Tiering policy switches

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub orthanc: OrthancConfig,
    pub backup: BackupConfig,
    pub resolver: ResolverConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone)]
pub struct OrthancConfig {
    /// Base URL of the Orthanc REST API
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Listing endpoint used as the reachability probe
    pub probe_path: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub dir: PathBuf,
    pub layout: BackupLayout,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub strategy: ResolverStrategy,
    /// Age after which the index is rebuilt even on a hit
    pub index_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Delete the source instance after a legacy embed/remove derive
    pub prune_superseded: bool,
    /// Also write the local tier when the remote save succeeds
    pub mirror_local_on_remote_success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupLayout {
    /// One file per study
    Keyed,
    /// One shared JSON map
    Blob,
}

impl std::str::FromStr for BackupLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keyed" => Ok(Self::Keyed),
            "blob" => Ok(Self::Blob),
            _ => Err(format!("Unknown backup layout: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverStrategy {
    /// Scan the whole catalog on every call
    Scan,
    /// Build an identifier index once and reuse it
    Index,
}

impl std::str::FromStr for ResolverStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scan" => Ok(Self::Scan),
            "index" => Ok(Self::Index),
            _ => Err(format!("Unknown resolver strategy: {}", s)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orthanc: OrthancConfig {
                base_url: "http://localhost:8042".to_string(),
                username: None,
                password: None,
                probe_path: "/studies".to_string(),
                timeout: Duration::from_secs(30),
            },
            backup: BackupConfig {
                dir: default_backup_dir(),
                layout: BackupLayout::Keyed,
            },
            resolver: ResolverConfig {
                strategy: ResolverStrategy::Index,
                index_ttl: Duration::from_secs(300),
            },
            policy: PolicyConfig {
                prune_superseded: true,
                mirror_local_on_remote_success: false,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Self {
            orthanc: OrthancConfig {
                base_url: env_or("ORTHANC_URL", &defaults.orthanc.base_url),
                username: env::var("ORTHANC_USERNAME").ok(),
                password: env::var("ORTHANC_PASSWORD").ok(),
                probe_path: env_or("ORTHANC_PROBE_PATH", &defaults.orthanc.probe_path),
                timeout: Duration::from_secs(
                    env_or("ORTHANC_TIMEOUT_SECS", "30").parse().unwrap_or(30),
                ),
            },
            backup: BackupConfig {
                dir: env::var("MEMO_BACKUP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.backup.dir),
                layout: env_or("MEMO_BACKUP_LAYOUT", "keyed")
                    .parse()
                    .unwrap_or(BackupLayout::Keyed),
            },
            resolver: ResolverConfig {
                strategy: env_or("MEMO_RESOLVER", "index")
                    .parse()
                    .unwrap_or(ResolverStrategy::Index),
                index_ttl: Duration::from_secs(
                    env_or("MEMO_INDEX_TTL_SECS", "300").parse().unwrap_or(300),
                ),
            },
            policy: PolicyConfig {
                prune_superseded: env_flag("MEMO_PRUNE_SUPERSEDED", true),
                mirror_local_on_remote_success: env_flag("MEMO_MIRROR_LOCAL", false),
            },
        }
    }

    /// Configuration pointing at a specific server and backup directory,
    /// with every other setting at its default.
    pub fn for_server(base_url: &str, backup_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.orthanc.base_url = base_url.to_string();
        config.backup.dir = backup_dir.into();
        config
    }
}

fn default_backup_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("study-memo"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
