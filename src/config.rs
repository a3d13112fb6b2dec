//! Runtime configuration for txpipe.
//!
//! One [`Config`] is built in `main` and passed into every component; no
//! global state. Values layer CLI overrides on top of an optional
//! `txpipe.toml`, with secrets taken from the environment (loaded via
//! `dotenvy` before this module runs).

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::job::{Job, PollSettings};

const DEFAULT_CONTAINER: &str = "docker-compose_backend_1";
const DEFAULT_LOG_WINDOW: &str = "2m";
const DEFAULT_SETTLE_SECS: u64 = 5;

/// Values the CLI may override; `None` falls through to `txpipe.toml`
/// and then to defaults.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub ssh_user: Option<String>,
    pub database: Option<String>,
    pub db_user: Option<String>,
    pub db_port: Option<u16>,
    pub scripts_file: Option<PathBuf>,
    pub grace_secs: Option<u64>,
    pub interval_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub verbose: bool,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub ssh_user: String,
    pub db_port: u16,
    pub database: String,
    pub db_user: String,
    pub db_password: String,
    pub container: String,
    pub log_window: String,
    pub management_port: u16,
    pub management_user: String,
    pub management_password: String,
    pub scripts_file: PathBuf,
    pub poll: PollSettings,
    pub settle: Duration,
    pub verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TxpipeToml {
    #[serde(default)]
    remote: RemoteSection,
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    management: ManagementSection,
    #[serde(default)]
    polling: PollingSection,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteSection {
    host: Option<String>,
    user: Option<String>,
    container: Option<String>,
    log_window: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    port: Option<u16>,
    name: Option<String>,
    user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ManagementSection {
    port: Option<u16>,
    user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PollingSection {
    grace_secs: Option<u64>,
    interval_secs: Option<u64>,
    max_attempts: Option<u32>,
    settle_secs: Option<u64>,
}

impl TxpipeToml {
    fn load(dir: &Path) -> Result<Self> {
        let path = dir.join("txpipe.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

impl Config {
    /// Resolve configuration from `txpipe.toml` in `dir`, CLI overrides,
    /// and environment secrets.
    pub fn load(dir: &Path, overrides: Overrides) -> Result<Self> {
        let file = TxpipeToml::load(dir)?;

        let Some(host) = overrides.host.or(file.remote.host) else {
            bail!("Remote host not set. Pass --host or set [remote] host in txpipe.toml.");
        };
        let Some(database) = overrides.database.or(file.database.name) else {
            bail!("Database name not set. Pass --database or set [database] name in txpipe.toml.");
        };
        let ssh_user = overrides
            .ssh_user
            .or(file.remote.user)
            .unwrap_or_else(whoami_fallback);
        let db_user = overrides
            .db_user
            .or(file.database.user)
            .unwrap_or_else(|| database.clone());

        let db_password = std::env::var("TXPIPE_DB_PASSWORD")
            .context("TXPIPE_DB_PASSWORD not set (use the environment or a .env file)")?;
        let management_password =
            std::env::var("TXPIPE_MGMT_PASSWORD").unwrap_or_else(|_| "secret".to_string());

        let poll = PollSettings {
            grace: Duration::from_secs(
                overrides
                    .grace_secs
                    .or(file.polling.grace_secs)
                    .unwrap_or(PollSettings::default().grace.as_secs()),
            ),
            interval: Duration::from_secs(
                overrides
                    .interval_secs
                    .or(file.polling.interval_secs)
                    .unwrap_or(PollSettings::default().interval.as_secs()),
            ),
            max_attempts: overrides
                .max_attempts
                .or(file.polling.max_attempts)
                .unwrap_or(PollSettings::default().max_attempts),
        };

        Ok(Self {
            host,
            ssh_user,
            db_port: overrides.db_port.or(file.database.port).unwrap_or(5432),
            database,
            db_user,
            db_password,
            container: file
                .remote
                .container
                .unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
            log_window: file
                .remote
                .log_window
                .unwrap_or_else(|| DEFAULT_LOG_WINDOW.to_string()),
            management_port: file.management.port.unwrap_or(8080),
            management_user: file
                .management
                .user
                .unwrap_or_else(|| "management".to_string()),
            management_password,
            scripts_file: overrides
                .scripts_file
                .unwrap_or_else(|| dir.join("scripts.sql")),
            poll,
            settle: Duration::from_secs(
                file.polling.settle_secs.unwrap_or(DEFAULT_SETTLE_SECS),
            ),
            verbose: overrides.verbose,
        })
    }

    /// The homebanking export job, always launched first in each phase.
    pub fn export_job(&self) -> Job {
        self.job("homebankingExportJob")
    }

    /// The transaction process job, always launched last in each phase.
    pub fn process_job(&self) -> Job {
        self.job("transactionProcessJob")
    }

    fn job(&self, name: &str) -> Job {
        let launch = vec![
            "docker".to_string(),
            "exec".to_string(),
            self.container.clone(),
            "curl".to_string(),
            "-sf".to_string(),
            "-u".to_string(),
            format!("{}:{}", self.management_user, self.management_password),
            "-X".to_string(),
            "GET".to_string(),
            format!(
                "http://localhost:{}/management/jolokia/exec/p2p-rest:module=core,category=job,name=JobRunner/runJob/{name}/DEFAULT",
                self.management_port
            ),
        ];

        // The pipe is interpreted by the remote shell; ssh joins the
        // argument list into one remote command line.
        let check = vec![
            "docker".to_string(),
            "logs".to_string(),
            "--since".to_string(),
            self.log_window.clone(),
            self.container.clone(),
            "|".to_string(),
            "grep".to_string(),
            "-i".to_string(),
            format!("'{name} status=FINISHED'"),
        ];

        Job::new(name, launch, check)
    }
}

fn whoami_fallback() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}
