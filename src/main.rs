// tailtrim - conversation tail-trimming engine
//
// Rewrites conversation payloads so only the most recent messages of the
// active branch remain, leaving everything else byte for byte intact.
//
// Architecture:
// - Engine (tailtrim::engine): pure tree, classification and text-scan steps
// - Trimmer (tailtrim::trim): wires the engine to cache, policy and notifier
// - Cache: per-conversation tails, overrides and metadata in a JSON file
// - Storage: trim events written to JSON Lines files
// - Event system: mpsc channel from the trimmer to the event log

mod cli;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::run(cli).await
}
