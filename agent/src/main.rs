use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use profile_agent::args::{Commands, Opt};
use profile_agent::config::AgentConfig;

fn init_logger() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let opt = Opt::parse();
    match opt.command {
        Commands::Run { config, collector, service, labels, seed } => {
            let mut config = AgentConfig::from_path(&config)?;
            if let Some(collector) = collector {
                config.collector.addr = collector;
            }
            if let Some(service) = service {
                config.collector.service = service;
            }
            config.labels.extend(labels);

            let mut builder = config.builder();
            if let Some(seed) = seed {
                builder = builder.with_seed(seed);
            }

            let shutdown = CancellationToken::new();
            let mut agent = builder
                .start(&shutdown)
                .context("failed to start profiling agent")?;
            info!("sending profiles of {} to {}", config.collector.service, config.collector.addr);

            signal::ctrl_c().await.context("failed to listen for event")?;
            info!("exiting");
            agent.stop().await?;
        }
        Commands::Once { config, ptype } => {
            let config = AgentConfig::from_path(&config)?;
            let mut agent = config.builder().build()?;
            agent.collect_once(ptype).await?;
            info!("{ptype} profile sent to {}", config.collector.addr);
        }
    }

    Ok(())
}
