//! # Hostcast Chat
//!
//! Every line typed on stdin is posted to the channel; every message from
//! another participant is printed on stdout. Logs go to stderr.
//!
//! ```text
//! $ hostcast-chat lobby          # terminal 1, becomes the hub
//! $ hostcast-chat lobby          # terminal 2, connects as a peer
//! ```
//!
//! Set `RUST_LOG=debug` to watch the election.

use anyhow::{Context, Result};
use clap::Parser;
use hostcast::{ChannelEvent, ChannelManager, RelayConfig};
use shared_types::RendezvousAddress;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How long to wait for coordinators to release the port on exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "hostcast-chat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Channel to join
    #[arg(default_value = "chat")]
    channel: String,

    /// Rendezvous address shared by every participant
    #[arg(long, env = "HOSTCAST_URL")]
    url: Option<String>,

    /// Print the coordinator state machine as PlantUML and exit
    #[arg(long)]
    diagram: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<RelayConfig> {
    let mut config = RelayConfig::from_env();
    if let Some(url) = &args.url {
        config.default_address = RendezvousAddress::parse(url)
            .with_context(|| format!("Invalid rendezvous URL {url:?}"))?;
    }
    config.validate().context("Invalid relay configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.diagram {
        println!("{}", hostcast::election_diagram(true));
        return Ok(());
    }

    init_logging(args.json_logs)?;
    let config = load_config(&args)?;

    let manager = ChannelManager::new(config);
    let mut channel = manager
        .create_channel(&args.channel)
        .context("Failed to open channel")?;
    info!(
        channel = %channel.name(),
        address = %channel.address(),
        id = %channel.id(),
        "Joined channel. Type to send, Ctrl+D or Ctrl+C to leave."
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        let text = line.trim_end();
                        if !text.is_empty() {
                            channel.post_message(text);
                        }
                    }
                    None => break,
                }
            }
            event = channel.recv() => match event {
                Some(ChannelEvent::Message(text)) => println!("{text}"),
                Some(ChannelEvent::Error(e)) => warn!(error = %e, "Relay fault"),
                Some(ChannelEvent::Close) | None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Graceful shutdown
    channel.close();
    for coordinator in manager.shutdown() {
        if tokio::time::timeout(SHUTDOWN_GRACE, coordinator.closed())
            .await
            .is_err()
        {
            warn!(address = %coordinator.address(), "Coordinator did not shut down in time");
        }
    }
    info!("Left channel");
    Ok(())
}
