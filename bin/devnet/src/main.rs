//! A local network: the liquid staking core, simulated host zones and a relayer between them,
//! advanced one block per tick.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use liquid_stake_common::{logging, logging::LoggerConfig};
use liquid_stake_params::Params;
use network::Devnet;
use serde::de::DeserializeOwned;
use tokio::{signal, time};
use tracing::{debug, info, trace};

mod args;
mod config;
mod constants;
mod network;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(LoggerConfig::with_base_name("devnet").with_default_directives("info,devnet=debug"));

    let cli = args::Cli::parse();

    let params = parse_toml::<Params>(&cli.params)?;
    params.validate().context("invalid params")?;
    let config = parse_toml::<Config>(&cli.config)?;
    let tick_interval = config.tick_interval;

    let mut devnet = Devnet::bootstrap(params, config)?;
    info!(?tick_interval, limit = ?cli.blocks, "starting devnet");

    let mut ticker = time::interval(tick_interval);
    let mut produced = 0u64;
    while !matches!(cli.blocks, Some(limit) if produced >= limit) {
        tokio::select! {
            _ = ticker.tick() => {
                for event in devnet.step()? {
                    info!(height = %devnet.height(), ?event, "event");
                }
                produced += 1;
            }
            _ = signal::ctrl_c() => {
                info!("received interrupt");
                break;
            }
        }
    }

    info!(height = %devnet.height(), %produced, "devnet stopped");
    Ok(())
}

fn parse_toml<T>(path: &Path) -> Result<T>
where
    T: std::fmt::Debug + DeserializeOwned,
{
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    trace!(?raw, "read file");

    let parsed = toml::from_str::<T>(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    debug!(?parsed, "parsed TOML file");

    Ok(parsed)
}
