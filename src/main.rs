use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use txpipe::channel::SshChannel;
use txpipe::config::{Config, Overrides};
use txpipe::gate::ConsoleOperator;
use txpipe::pipeline::{Pipeline, PipelineSettings};
use txpipe::script::ScriptSet;
use txpipe::store::PgStore;
use txpipe::ui::PipelineUI;

#[derive(Parser)]
#[command(name = "txpipe")]
#[command(version, about = "Two-phase transaction batch pipeline driver")]
pub struct Cli {
    /// Remote host running the backend container (also the database host)
    #[arg(long)]
    pub host: Option<String>,

    /// SSH login name on the remote host
    #[arg(long)]
    pub ssh_user: Option<String>,

    /// Database name
    #[arg(long)]
    pub database: Option<String>,

    /// Database role
    #[arg(long)]
    pub db_user: Option<String>,

    /// Database port
    #[arg(long)]
    pub db_port: Option<u16>,

    /// Path to the scripts file (default: ./scripts.sql)
    #[arg(long)]
    pub scripts: Option<PathBuf>,

    /// Seconds to wait before the first completion check
    #[arg(long)]
    pub grace_secs: Option<u64>,

    /// Seconds between completion checks
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Maximum completion-check attempts per job
    #[arg(long)]
    pub max_attempts: Option<u32>,

    #[arg(short, long)]
    pub verbose: bool,
}

fn init_tracing(verbose: bool) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(".", "run.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if verbose { "txpipe=debug" } else { "txpipe=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.verbose);

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(
        &cwd,
        Overrides {
            host: cli.host,
            ssh_user: cli.ssh_user,
            database: cli.database,
            db_user: cli.db_user,
            db_port: cli.db_port,
            scripts_file: cli.scripts,
            grace_secs: cli.grace_secs,
            interval_secs: cli.interval_secs,
            max_attempts: cli.max_attempts,
            verbose: cli.verbose,
        },
    )?;

    // Fail on a malformed scripts file before touching any connection.
    let scripts = ScriptSet::load(&config.scripts_file)?;

    let store = PgStore::connect(
        &config.host,
        config.db_port,
        &config.database,
        &config.db_user,
        &config.db_password,
    )
    .await?;

    info!(host = %config.host, user = %config.ssh_user, "opening ssh session");
    let channel = match SshChannel::connect(&config.host, &config.ssh_user).await {
        Ok(channel) => channel,
        Err(e) => {
            // The store opened but the channel did not; close what we hold.
            let mut store = store;
            txpipe::store::Store::close(&mut store).await;
            return Err(e.into());
        }
    };

    PipelineUI::new(config.verbose).banner(&config.host);

    let settings = PipelineSettings::from_config(&config, scripts);
    let mut pipeline = Pipeline::new(channel, store, ConsoleOperator, settings);

    match pipeline.execute().await {
        Ok(()) => Ok(()),
        Err(e) if e.is_cancellation() => {
            // Operator said "no" at the gate: clean exit, not a failure.
            println!("Cancelled.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
