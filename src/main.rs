mod cli;

use std::fs::File;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::{LevelFilter, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use cli::Cli;
use mk2_fand::{config::ConfigManager, coordinator::SystemCoordinator};

const DAEMON_LOG: &str = "/var/tmp/mk2_fand.log";

fn init_log(level: LevelFilter) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "mk2_fand".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|_| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn into_daemon() -> Result<()> {
    File::create(DAEMON_LOG)
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

async fn run(cli: Cli) -> Result<()> {
    let config_manager = ConfigManager::load(cli.config).await?;

    SystemCoordinator::new().run(config_manager).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Fork before any runtime threads exist.
    if cli.daemonize {
        into_daemon()?;
    }
    init_log(cli.log_level.into())?;

    #[cfg(feature = "tokio-console")]
    console_subscriber::init();

    info!("mk2_fand {} starting", env!("CARGO_PKG_VERSION"));

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(run(cli))
}
