//! Command line interface for the `shardwire` binary.
//!
//! The binary runs a single shard and logs the events named on the command
//! line. The same definition generates the manual page in `build.rs`.

use std::net::SocketAddr;

use clap::Parser;

/// Command line arguments for the `shardwire` binary.
#[derive(Debug, Parser)]
#[command(name = "shardwire", version, about = "Run one gateway shard and log its events")]
pub struct Cli {
    /// Bot token used to identify.
    #[arg(long, env = "SHARDWIRE_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Gateway intents bitfield.
    #[arg(short, long, default_value_t = 0)]
    pub intents: u64,

    /// Index of this shard.
    #[arg(long, default_value_t = 0)]
    pub shard: u32,

    /// Total number of shards.
    #[arg(long, default_value_t = 1)]
    pub shard_count: u32,

    /// Gateway base URL.
    #[arg(long)]
    pub gateway: Option<String>,

    /// HTTP proxy to tunnel the gateway connection through.
    #[arg(long)]
    pub proxy: Option<String>,

    /// Dispatch event to log; repeat for several.
    #[arg(short, long = "event", value_name = "EVENT")]
    pub events: Vec<String>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_shard_options() {
        let cli = Cli::parse_from([
            "shardwire",
            "--token",
            "abc",
            "--shard",
            "2",
            "--shard-count",
            "4",
            "-e",
            "READY",
            "--event",
            "MESSAGE_CREATE",
        ]);
        assert_eq!(cli.token, "abc");
        assert_eq!((cli.shard, cli.shard_count), (2, 4));
        assert_eq!(cli.events, ["READY", "MESSAGE_CREATE"]);
        assert!(cli.metrics_addr.is_none());
    }

    #[test]
    fn shard_defaults_to_single_shard() {
        let cli = Cli::parse_from(["shardwire", "--token", "abc"]);
        assert_eq!((cli.shard, cli.shard_count, cli.intents), (0, 1, 0));
    }
}
