//! Command-line interface definitions

use std::path::PathBuf;

use clap::Parser;
use relay_core::RealmNumber;

#[derive(Parser, Debug, Default)]
#[command(name = "relay-peer", author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Relay address as host:port
    #[arg(short, long)]
    pub address: Option<String>,

    /// Realm to join
    #[arg(short, long)]
    pub realm: Option<RealmNumber>,

    /// Shard into child realms holding at most this many users
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Run against the built-in offline relay
    #[arg(long)]
    pub offline: bool,

    /// Simulated round trip for the offline relay, in milliseconds
    #[arg(long)]
    pub ping_ms: Option<u64>,

    /// Keep offline data between runs
    #[arg(long)]
    pub persist: bool,
}
