use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use pelican::config::{read_config, Config};
use pelican::server::Server;
use pelican::storage::Store;

#[derive(Parser)]
#[command(name = "pelican", version, about = "Fake SMTP sink for local integration testing")]
struct Args {
    /// Optional TOML configuration file; compiled-in defaults otherwise.
    #[arg(short, long, env = "PELICAN_CONFIG")]
    config: Option<PathBuf>,

    /// Override the SMTP listen address.
    #[arg(long, value_name = "ADDR")]
    smtp_bind: Option<SocketAddr>,

    /// Override the HTTP API listen address.
    #[arg(long, value_name = "ADDR")]
    http_bind: Option<SocketAddr>,

    /// Verbose logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => read_config(path.clone())?,
        None => Config::default(),
    };
    if let Some(addr) = args.smtp_bind {
        config.smtp.bind_addr = addr;
    }
    if let Some(addr) = args.http_bind {
        config.http.bind_addr = addr;
    }

    let store = Arc::new(Store::new());

    Server::new(config, store).run().await
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
