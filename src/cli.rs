use clap::Parser;

use crate::config::Config;

/// crawlspace cli
#[derive(Parser)]
#[command(name = "crawlspace")]
#[command(about = "Multi-tenant web crawler with a searchable word index")]
#[command(version)]
pub struct Cli {
    /// control api port
    #[arg(
        short,
        long,
        default_value_t = Config::DEFAULT_PORT,
        help = "Port the control API listens on"
    )]
    pub port: u16,

    /// platform data dir
    #[arg(
        short,
        long,
        default_value = "data",
        help = "Directory holding crawler state, the visited log, and index shards"
    )]
    pub data_dir: String,
}

impl Cli {
    /// parse args
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
