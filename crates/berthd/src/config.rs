//! Daemon configuration: command-line flags with environment fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use berth_core::{PrereleasePolicy, Settings};
use berth_state::{StoreFactory, SurrealHandle, SurrealStoreFactory};
use clap::{Parser, ValueEnum};
use tracing::Level;

/// Where release state is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// In-memory SurrealDB; state is lost on exit.
    Mem,
    /// SurrealKV files under `--data-dir`.
    Disk,
    /// Remote SurrealDB from `SURREALDB_*` variables.
    Remote,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "berthd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Berth release coordination daemon", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "BERTH_BIND", default_value = "127.0.0.1:8787")]
    pub bind: SocketAddr,

    /// Storage backend
    #[arg(long, env = "BERTH_STORE", value_enum, default_value_t = StoreKind::Disk)]
    pub store: StoreKind,

    /// Data directory for the disk store
    #[arg(long, env = "BERTH_DATA_DIR", default_value = ".berth/data")]
    pub data_dir: PathBuf,

    /// Simulated deployment duration in milliseconds (0 waits for CI reports)
    #[arg(long, env = "BERTH_SIMULATED_DEPLOY_MS", default_value_t = 5000)]
    pub simulated_deploy_ms: u64,

    /// How pre-release suffixes order: `ignore` or `semver`
    #[arg(long, env = "BERTH_PRERELEASE_POLICY", default_value = "ignore")]
    pub prerelease_policy: PrereleasePolicy,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "BERTH_LOG_JSON")]
    pub json: bool,
}

impl Config {
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            simulated_deploy: (self.simulated_deploy_ms > 0)
                .then(|| Duration::from_millis(self.simulated_deploy_ms)),
            prerelease_policy: self.prerelease_policy,
            ..Settings::default()
        }
    }

    /// Connect the configured backend.
    pub async fn open_store(&self) -> Result<Arc<dyn StoreFactory>> {
        let handle = match self.store {
            StoreKind::Mem => SurrealHandle::setup_db()
                .await
                .context("Failed to start in-memory store")?,
            StoreKind::Disk => {
                std::fs::create_dir_all(&self.data_dir).with_context(|| {
                    format!("Failed to create data directory {}", self.data_dir.display())
                })?;
                SurrealHandle::setup_path(&self.data_dir)
                    .await
                    .with_context(|| format!("Failed to open store at {}", self.data_dir.display()))?
            }
            StoreKind::Remote => SurrealHandle::setup_from_env()
                .await
                .context("Failed to connect to remote store")?,
        };
        Ok(Arc::new(SurrealStoreFactory::new(Arc::new(handle))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = Config::try_parse_from(["berthd"]).unwrap();
        assert_eq!(config.store, StoreKind::Disk);
        assert_eq!(config.prerelease_policy, PrereleasePolicy::Ignore);
        assert_eq!(
            config.settings().simulated_deploy,
            Some(Duration::from_millis(5000))
        );
    }

    #[test]
    fn zero_delay_disables_simulation() {
        let config = Config::try_parse_from([
            "berthd",
            "--store",
            "mem",
            "--simulated-deploy-ms",
            "0",
            "--prerelease-policy",
            "semver",
        ])
        .unwrap();
        assert_eq!(config.store, StoreKind::Mem);
        assert!(config.settings().simulated_deploy.is_none());
        assert_eq!(
            config.settings().prerelease_policy,
            PrereleasePolicy::SemverPrecedence
        );
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Config::try_parse_from(["berthd", "--prerelease-policy", "loose"]).is_err());
    }
}
