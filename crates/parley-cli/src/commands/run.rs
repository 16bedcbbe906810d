//! `parley run` -- run the pipeline on the console channel.
//!
//! Every stdin line is an inbound message from `--sender`; replies from the
//! echo engine are printed to stdout. `!file <path> [mime]` attaches a
//! local file.
//!
//! # Lifecycle
//!
//! ```text
//! 1. Register the console channel
//! 2. Build the coordinator and approve the console sender
//! 3. Start all channels
//! 4. Wait for Ctrl+C or end of input
//! 5. Stop intake, drain the pipeline, stop channels
//! ```

use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parley_channels::console::CONSOLE_CHANNEL_ID;
use parley_channels::{ChannelRegistry, ConsoleChannel};
use parley_core::{Coordinator, EchoEngine};
use parley_types::config::Config;

/// Arguments for the `parley run` subcommand.
#[derive(Args)]
pub struct RunArgs {
    /// Sender id the console input is attributed to.
    #[arg(long, default_value = "local")]
    pub sender: String,

    /// Display name for the console sender.
    #[arg(long)]
    pub name: Option<String>,
}

/// Run until Ctrl+C or end of input, then shut down gracefully.
pub async fn run(args: RunArgs, config: Config) -> anyhow::Result<()> {
    let registry = Arc::new(ChannelRegistry::from_config(&config));
    if !registry.is_enabled(CONSOLE_CHANNEL_ID) {
        anyhow::bail!("the console channel is disabled in the configuration");
    }

    let mut console = ConsoleChannel::stdio(args.sender.clone());
    if let Some(name) = &args.name {
        console = console.with_display_name(name.clone());
    }
    let input_closed = console.input_closed();
    registry.register(Arc::new(console)).await?;

    let coordinator = Arc::new(Coordinator::new(config, registry.clone(), Arc::new(EchoEngine)));
    if coordinator.enforcer().approve(CONSOLE_CHANNEL_ID, &args.sender) {
        info!(sender = %args.sender, "console sender approved");
    }

    let cancel = CancellationToken::new();
    let results = registry.start_all(coordinator.clone(), &cancel).await;
    for (name, result) in &results {
        match result {
            Ok(()) => info!(channel = %name, "channel started"),
            Err(e) => warn!(channel = %name, error = %e, "channel failed to start"),
        }
    }
    if results.iter().all(|(_, r)| r.is_err()) {
        anyhow::bail!("no channel could be started");
    }

    info!("parley running -- type a message, Ctrl+C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("received shutdown signal");
        }
        _ = input_closed.cancelled() => info!("console input closed"),
    }

    // 1. Stop intake.
    cancel.cancel();

    // 2. Flush buckets and drain dispatches.
    coordinator.shutdown().await;

    // 3. Stop channels.
    for (name, result) in registry.stop_all().await {
        match result {
            Ok(()) => info!(channel = %name, "channel stopped"),
            Err(e) => warn!(channel = %name, error = %e, "channel stop error"),
        }
    }

    let m = coordinator.metrics();
    info!(
        received = m.received,
        dispatched = m.dispatched,
        responded = m.responded,
        failed = m.failed,
        "shutdown complete"
    );
    Ok(())
}
