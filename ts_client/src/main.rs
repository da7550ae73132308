//! Watch and play one table of a live poker server from the terminal.

use anyhow::{Context, Result};
use pico_args::Arguments;
use tracing::info;
use ts_client::{
    app,
    config::{CliOverrides, ClientConfig},
    logging,
};

const HELP: &str = "\
Watch one table of a live poker server

USAGE:
  ts_client [OPTIONS]

OPTIONS:
  --server URL          WebSocket URL  [env: TS_SERVER_URL] [default: ws://127.0.0.1:6969/ws]
  --table ID            Table to watch [env: TS_TABLE_ID]
  --player NAME         Your player id, to find your seat [env: TS_PLAYER]

FLAGS:
  -h, --help            Print help information

ENVIRONMENT:
  TS_HEARTBEAT_SECS, TS_RECONNECT_BASE_MS, TS_RECONNECT_MAX_MS,
  TS_RECONNECT_MAX_RETRIES, TS_MAX_MISSED_PONGS, RUST_LOG
";

#[tokio::main]
async fn main() -> Result<()> {
    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = CliOverrides {
        server_url: pargs.opt_value_from_str("--server")?,
        table_id: pargs.opt_value_from_str("--table")?,
        player: pargs.opt_value_from_str("--player")?,
    };

    logging::init();
    let config = ClientConfig::from_env(overrides).context("Invalid configuration")?;
    info!("Starting ts_client for table {}", config.table_id);

    app::run(config).await
}
