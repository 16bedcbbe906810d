//! `parley chunk` -- split stdin into outbound fragments.
//!
//! Uses the outbound settings of `--channel` (or the defaults) unless
//! `--max-length` / `--mode` override them.
//!
//! # Examples
//!
//! ```text
//! cat reply.md | parley chunk --max-length 2000
//! parley chunk --channel telegram --mode plain --json < reply.txt
//! ```

use clap::{Args, ValueEnum};
use tokio::io::AsyncReadExt;

use parley_core::chunker;
use parley_types::config::{ChunkMode, Config};
use parley_types::event::OutboundFragment;

/// Splitting strategy, as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Structured,
    Plain,
}

impl From<ModeArg> for ChunkMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Structured => ChunkMode::Structured,
            ModeArg::Plain => ChunkMode::Plain,
        }
    }
}

/// Arguments for the `parley chunk` subcommand.
#[derive(Args)]
pub struct ChunkArgs {
    /// Channel whose outbound settings apply.
    #[arg(long)]
    pub channel: Option<String>,

    /// Maximum fragment length in characters.
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Splitting strategy.
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Print fragments as a JSON array.
    #[arg(long)]
    pub json: bool,
}

/// Read all of stdin and print its fragments.
pub async fn run(args: ChunkArgs, config: &Config) -> anyhow::Result<()> {
    let mut text = String::new();
    tokio::io::stdin().read_to_string(&mut text).await?;

    let (mode, max_length) = settings(&args, config)?;
    let fragments = chunker::split(&text, mode, max_length);
    println!("{}", render(&fragments, args.json)?);
    Ok(())
}

/// Resolve the effective mode and limit.
fn settings(args: &ChunkArgs, config: &Config) -> anyhow::Result<(ChunkMode, usize)> {
    let outbound = match &args.channel {
        Some(id) => &config.channel(id).outbound,
        None => &config.defaults.outbound,
    };
    let max_length = args.max_length.unwrap_or(outbound.max_length);
    if max_length == 0 {
        anyhow::bail!("--max-length must be positive");
    }
    let mode = args.mode.map_or(outbound.mode, ChunkMode::from);
    Ok((mode, max_length))
}

fn render(fragments: &[OutboundFragment], json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(fragments)?);
    }
    let total = fragments.len();
    let blocks: Vec<String> = fragments
        .iter()
        .map(|f| {
            format!(
                "--- fragment {}/{} ({} chars) ---\n{}",
                f.sequence_index + 1,
                total,
                f.text.chars().count(),
                f.text
            )
        })
        .collect();
    Ok(blocks.join("\n"))
}
