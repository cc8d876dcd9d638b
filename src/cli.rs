// CLI module - command-line argument parsing and handlers
//
// Subcommands:
// - trim: trim a payload read from a file or stdin
// - tail / default-tail: show or set tail sizes
// - override: force the optimizer on or off for one conversation
// - cache: inspect what the cache knows about a conversation
// - config --show|--path|--reset: configuration management

use anyhow::{bail, Context, Result};
use clap::builder::TypedValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tailtrim::cache::{CacheStore, FileCache, Override};
use tailtrim::config::{Config, VERSION};
use tailtrim::events::Notifier;
use tailtrim::policy::{EnablementPolicy, OptimizerSwitch};
use tailtrim::sse::trim_event_stream;
use tailtrim::storage::{generate_session_id, EventLog};
use tailtrim::trim::{TrimContext, TrimOutcome, Trimmer};
use tokio::sync::mpsc;

/// tailtrim - keep long conversations light by trimming them to their tail
#[derive(Parser)]
#[command(name = "tailtrim")]
#[command(version = VERSION)]
#[command(about = "Trim conversation payloads to their most recent messages", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trim a payload read from FILE (or stdin) and write it to stdout
    Trim {
        /// Input file; stdin when omitted
        file: Option<PathBuf>,

        /// Delivery shape of the payload
        #[arg(long, value_enum, default_value_t = ChannelArg::Auto)]
        channel: ChannelArg,

        /// Conversation id, when the payload does not carry one
        #[arg(long)]
        conv_id: Option<String>,

        /// URL the payload came from (used to find the conversation id)
        #[arg(long)]
        url: Option<String>,

        /// Tail size for this run, overriding stored tails
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize))]
        tail: Option<usize>,

        /// Write the result here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show or set the tail size of a conversation
    Tail {
        conv: String,
        size: Option<usize>,
    },

    /// Show or set the global default tail (setting it clears per-conversation tails)
    DefaultTail { size: Option<usize> },

    /// Force the optimizer on or off for a conversation, or clear the override
    Override { conv: String, state: OverrideArg },

    /// Show cached metadata for a conversation
    Cache { conv: String },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelArg {
    /// Document when the input is one JSON value (falling back to fragment
    /// when that leaves it alone), event stream when it has `data:` lines,
    /// fragment otherwise
    Auto,
    Document,
    Fragment,
    Embedded,
    Sse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverrideArg {
    On,
    Off,
    Clear,
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    // These work even when the config file is broken
    if let Commands::Config {
        show: false,
        reset,
        path,
    } = &cli.command
    {
        return handle_config_early(*reset, *path);
    }

    Config::ensure_config_exists();
    let config = Config::from_env()?;
    let _log_guard = tailtrim::logging::init(&config.logging);

    match cli.command {
        Commands::Trim {
            file,
            channel,
            conv_id,
            url,
            tail,
            output,
        } => {
            let input = read_input(file.as_deref())?;
            let ctx = TrimContext::new(conv_id.as_deref(), url.as_deref());
            let outcome = handle_trim(&config, &input, channel, ctx, tail).await?;
            write_output(output.as_deref(), &outcome.into_text(&input))
        }
        Commands::Tail { conv, size } => handle_tail(&config, &conv, size),
        Commands::DefaultTail { size } => handle_default_tail(&config, size),
        Commands::Override { conv, state } => handle_override(&config, &conv, state),
        Commands::Cache { conv } => handle_cache(&config, &conv),
        Commands::Config { .. } => {
            handle_config_show(&config);
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// trim
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_trim(
    config: &Config,
    input: &str,
    channel: ChannelArg,
    ctx: TrimContext<'_>,
    tail: Option<usize>,
) -> Result<TrimOutcome> {
    let mut cache = FileCache::load(&config.cache_path)?;
    let switch = OptimizerSwitch::new(config.trim.optimizer_enabled)
        .with_overrides(cache.state().overrides().clone());

    let (event_tx, log_task) = if config.features.event_log {
        let (tx, rx) = mpsc::channel(256);
        let log = EventLog::new(&config.log_dir, &generate_session_id(), rx)?;
        (Some(tx), Some(tokio::spawn(log.run())))
    } else {
        (None, None)
    };

    let outcome = {
        let mut trimmer = Trimmer::new(config.trim.clone(), &mut cache, switch, event_tx);
        if let Some(tail) = tail {
            trimmer = trimmer.with_fixed_tail(tail);
        }
        trim_with(&mut trimmer, channel, input, ctx)
        // Dropping the trimmer closes the event channel
    };

    cache.save()?;
    if let Some(task) = log_task {
        task.await.context("Event log task panicked")??;
    }

    match &outcome {
        TrimOutcome::Unchanged => tracing::info!("Nothing to trim, payload passed through"),
        TrimOutcome::Modified {
            replacements,
            stats,
            ..
        } => {
            for s in stats {
                eprintln!(
                    "{}: kept {} of {} messages ({} -> {} nodes)",
                    s.conv_id, s.kept_renderable, s.renderable_total, s.nodes_before, s.nodes_after
                );
            }
            tracing::debug!(replacements, "Payload rewritten");
        }
    }
    Ok(outcome)
}

/// Run the trimmer over `input` in the shape `channel` names.
///
/// Under `auto`, a JSON document that the document shape leaves alone is
/// scanned again as a fragment, which finds conversations nested deeper
/// than the root or a top-level `conversation` key.
fn trim_with<C, P, N>(
    trimmer: &mut Trimmer<C, P, N>,
    channel: ChannelArg,
    input: &str,
    ctx: TrimContext<'_>,
) -> TrimOutcome
where
    C: CacheStore,
    P: EnablementPolicy,
    N: Notifier,
{
    match resolve_channel(channel, input) {
        ChannelArg::Document => match trimmer.trim_document(input, ctx) {
            TrimOutcome::Unchanged if channel == ChannelArg::Auto => {
                tracing::debug!("Document shape left input alone, scanning as fragment");
                trimmer.trim_fragment(input, ctx)
            }
            outcome => outcome,
        },
        ChannelArg::Embedded => trimmer.trim_embedded(input, ctx),
        ChannelArg::Sse => trim_event_stream(trimmer, input, ctx),
        ChannelArg::Fragment | ChannelArg::Auto => trimmer.trim_fragment(input, ctx),
    }
}

fn resolve_channel(channel: ChannelArg, input: &str) -> ChannelArg {
    if channel != ChannelArg::Auto {
        return channel;
    }
    if serde_json::from_str::<serde::de::IgnoredAny>(input).is_ok() {
        ChannelArg::Document
    } else if input.lines().any(|line| line.starts_with("data:")) {
        ChannelArg::Sse
    } else {
        ChannelArg::Fragment
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            Ok(input)
        }
    }
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes()).context("Failed to write stdout")?;
            stdout.flush().context("Failed to flush stdout")
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// tail / default-tail / override / cache
// ─────────────────────────────────────────────────────────────────────────────

fn handle_tail(config: &Config, conv: &str, size: Option<usize>) -> Result<()> {
    let mut cache = FileCache::load(&config.cache_path)?;

    let Some(requested) = size else {
        let stored = cache.tail_size(conv);
        let source = if stored.is_some() { "" } else { " (default)" };
        println!("{} tail = {}{}", conv, config.trim.effective_tail(stored), source);
        return Ok(());
    };

    let tail = config.trim.clamp(requested);
    if tail != requested {
        eprintln!(
            "Tail clamped to {} (allowed {}..={})",
            tail, config.trim.min_tail, config.trim.max_tail
        );
    }
    cache.state_mut().set_tail_size(conv, tail);
    cache.save()?;
    println!("{} tail = {}", conv, tail);
    Ok(())
}

fn handle_default_tail(config: &Config, size: Option<usize>) -> Result<()> {
    let Some(requested) = size else {
        println!("default_tail = {}", config.trim.default_tail);
        return Ok(());
    };

    let tail = config.trim.clamp(requested);
    if tail == config.trim.default_tail {
        println!("default_tail = {} (unchanged)", tail);
        return Ok(());
    }

    let mut updated = config.clone();
    updated.trim.default_tail = tail;
    updated.save().context("Failed to save config")?;

    // Stored tails were chosen relative to the old default
    let mut cache = FileCache::load(&config.cache_path)?;
    let cleared = cache.state_mut().clear_tails();
    cache.save()?;

    tracing::info!(tail, cleared, "Default tail changed");
    println!(
        "default_tail = {} ({} per-conversation tail(s) cleared)",
        tail, cleared
    );
    Ok(())
}

fn handle_override(config: &Config, conv: &str, state: OverrideArg) -> Result<()> {
    let value = match state {
        OverrideArg::On => Some(Override::On),
        OverrideArg::Off => Some(Override::Off),
        OverrideArg::Clear => None,
    };

    let mut cache = FileCache::load(&config.cache_path)?;
    cache.state_mut().set_override(conv, value);
    cache.save()?;

    match value {
        Some(v) => println!("{} override = {}", conv, v.as_str()),
        None => println!(
            "{} override cleared (global switch: {})",
            conv,
            if config.trim.optimizer_enabled { "on" } else { "off" }
        ),
    }
    Ok(())
}

fn handle_cache(config: &Config, conv: &str) -> Result<()> {
    let cache = FileCache::load(&config.cache_path)?;

    println!("conversation: {}", conv);
    match cache.meta(conv) {
        Some(meta) => {
            println!("renderable_total = {}", meta.renderable_total);
            println!("kept_renderable = {}", meta.kept_renderable_by_react);
        }
        None => println!("# no metadata cached"),
    }
    println!("flat_messages = {}", cache.flat(conv).len());
    println!("tail = {}", config.trim.effective_tail(cache.tail_size(conv)));
    if let Some(v) = cache.state().override_for(conv) {
        println!("override = {}", v.as_str());
    }
    println!("# Source: {}", cache.path().display());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// config
// ─────────────────────────────────────────────────────────────────────────────

fn handle_config_early(reset: bool, path: bool) -> Result<()> {
    if path {
        handle_config_path()
    } else if reset {
        handle_config_reset()
    } else {
        // No flag provided, show help
        println!("Usage: tailtrim config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
        Ok(())
    }
}

fn handle_config_path() -> Result<()> {
    let Some(path) = Config::config_path() else {
        bail!("Could not determine config path");
    };
    println!("{}", path.display());
    Ok(())
}

fn handle_config_show(config: &Config) {
    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_reset() -> Result<()> {
    let Some(path) = Config::config_path() else {
        bail!("Could not determine config path");
    };

    // Confirm if file exists
    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    // Config's single source of truth
    Config::default()
        .save()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tailtrim::cache::MemoryCache;
    use tailtrim::config::TrimSettings;
    use tailtrim::events::NoopNotifier;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_auto_channel_detection() {
        assert_eq!(resolve_channel(ChannelArg::Auto, r#"{"a":1}"#), ChannelArg::Document);
        assert_eq!(
            resolve_channel(ChannelArg::Auto, "event: x\ndata: {}\n\n"),
            ChannelArg::Sse
        );
        assert_eq!(
            resolve_channel(ChannelArg::Auto, r#"<script>{"mapping":{}}</script>"#),
            ChannelArg::Fragment
        );
        assert_eq!(resolve_channel(ChannelArg::Embedded, r#"{"a":1}"#), ChannelArg::Embedded);
    }

    #[test]
    fn test_trim_args() {
        let cli = Cli::parse_from([
            "tailtrim", "trim", "in.json", "--channel", "sse", "--conv-id", "c1", "--tail", "20",
        ]);
        let Commands::Trim {
            file,
            channel,
            conv_id,
            tail,
            ..
        } = cli.command
        else {
            panic!("expected trim");
        };
        assert_eq!(file, Some(PathBuf::from("in.json")));
        assert_eq!(channel, ChannelArg::Sse);
        assert_eq!(conv_id.as_deref(), Some("c1"));
        assert_eq!(tail, Some(20));
    }

    #[test]
    fn test_zero_tail_is_rejected() {
        assert!(Cli::try_parse_from(["tailtrim", "trim", "--tail", "0"]).is_err());
    }

    fn nested_document() -> String {
        let mut mapping = serde_json::Map::new();
        mapping.insert(
            "root".into(),
            serde_json::json!({"id": "root", "parent": null, "children": ["m0"], "message": null}),
        );
        for i in 0..15 {
            let parent = if i == 0 { "root".to_string() } else { format!("m{}", i - 1) };
            let children: Vec<String> = if i < 14 { vec![format!("m{}", i + 1)] } else { vec![] };
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            mapping.insert(
                format!("m{i}"),
                serde_json::json!({
                    "id": format!("m{i}"),
                    "parent": parent,
                    "children": children,
                    "message": {
                        "author": {"role": role},
                        "create_time": 1_700_000_000.0 + i as f64,
                        "content": {"content_type": "text", "parts": [format!("message {i}")]}
                    }
                }),
            );
        }
        serde_json::json!({
            "data": {
                "conversation": {
                    "conversation_id": "conv-nested",
                    "current_node": "m14",
                    "mapping": mapping,
                }
            }
        })
        .to_string()
    }

    #[test]
    fn test_auto_falls_back_to_fragment_for_nested_documents() {
        let input = nested_document();
        let mut cache = MemoryCache::new();
        let mut trimmer = Trimmer::new(
            TrimSettings::default(),
            &mut cache,
            OptimizerSwitch::default(),
            NoopNotifier,
        );

        let outcome = trim_with(&mut trimmer, ChannelArg::Auto, &input, TrimContext::default());
        assert!(outcome.is_modified());
        let out: serde_json::Value = serde_json::from_str(outcome.text().unwrap()).unwrap();
        let kept = out["data"]["conversation"]["mapping"].as_object().unwrap();
        assert_eq!(kept.len(), 10);

        // An explicit document channel does not look deeper
        let outcome = trim_with(&mut trimmer, ChannelArg::Document, &input, TrimContext::default());
        assert_eq!(outcome, TrimOutcome::Unchanged);
    }

    #[test]
    fn test_override_args() {
        let cli = Cli::parse_from(["tailtrim", "override", "c1", "clear"]);
        assert!(matches!(
            cli.command,
            Commands::Override { state: OverrideArg::Clear, .. }
        ));
    }
}
