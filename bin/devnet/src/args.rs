//! Parses command-line arguments for the devnet.

use std::path::PathBuf;

use clap::{crate_version, Parser};

#[derive(Debug, Parser)]
#[clap(
    name = "devnet",
    about = "Runs the liquid staking core against simulated host zones",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[clap(
        long,
        short = 'p',
        help = "The file containing the protocol params",
        default_value = "params.toml"
    )]
    pub params: PathBuf,

    #[clap(
        long,
        short = 'c',
        help = "The file describing the host zones and the scripted messages",
        default_value = "devnet.toml"
    )]
    pub config: PathBuf,

    #[clap(
        long,
        short = 'b',
        env = "DEVNET_BLOCKS",
        help = "Stop after this many blocks instead of running until interrupted"
    )]
    pub blocks: Option<u64>,
}
