//! Relay peer - host-electing relay client
//!
//! Joins a realm on a relay (or the built-in offline relay), negotiates a
//! host with the other peers and prints every frame as a JSON line on
//! stdout. Lines typed on stdin are sent to the realm.

use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod config;
mod error;
mod session;

use cli::Cli;
use config::Config;
use error::Result;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries frames only
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_cli(&cli)?;
    let input = BufReader::new(tokio::io::stdin());
    let mut out = std::io::stdout();

    if cli.offline {
        tracing::info!(realm = config.realm.number, "Starting offline session");
        session::run_offline(&config, input, &mut out).await
    } else {
        tracing::info!(
            address = %config.relay.address,
            realm = config.realm.number,
            "Starting session"
        );
        session::run_online(&config, input, &mut out).await
    }
}
