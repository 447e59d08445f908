//! stream-cache-cli: inspect and maintain a SQLite stream cache
//!
//! Usage:
//!   stream-cache-cli stats [--owner <id>]          Entry counts
//!   stream-cache-cli cleanup                       Remove expired entries now
//!   stream-cache-cli clear [--owner <id>]          Remove entries
//!   stream-cache-cli get <key>                     Print a stored event sequence
//!   stream-cache-cli classify <text>               Show how a prompt is classified

use ai_stream_cache::cache::{SqliteStreamStore, StreamStore};
use ai_stream_cache::{is_creative_request, Message};
use anyhow::{bail, Context};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_DB: &str = "stream_cache.db";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let rest = &args[2..];
    match args[1].as_str() {
        "stats" => block_on(cmd_stats(rest)),
        "cleanup" => block_on(cmd_cleanup(rest)),
        "clear" => block_on(cmd_clear(rest)),
        "get" => block_on(cmd_get(rest)),
        "classify" => cmd_classify(rest),
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"stream-cache-cli: maintenance tool for the streamed-response cache

USAGE:
    stream-cache-cli <COMMAND> [OPTIONS]

COMMANDS:
    stats [--owner <id>]        Show total, active and expired entry counts
    cleanup                     Remove expired entries
    clear [--owner <id>]        Remove all entries, or only one owner's
    get <key>                   Print the stored events for a cache key as JSON
    classify <text>             Classify a prompt as factual or creative
    version                     Show version information
    help                        Show this help message

OPTIONS:
    --db <path>                 Database file (default: {DEFAULT_DB})

ENVIRONMENT:
    AI_CACHE_DB                 Database file, when --db is not given
    RUST_LOG                    Log filter (default: info)"#
    );
}

fn version_line() -> String {
    format!("stream-cache-cli {}", env!("CARGO_PKG_VERSION"))
}

fn cmd_version() {
    println!("{}", version_line());
}

fn block_on<F>(fut: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(fut)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Arguments with `--flag value` pairs removed.
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
        } else {
            out.push(arg.as_str());
        }
    }
    out
}

fn resolve_db(args: &[String]) -> PathBuf {
    if let Some(path) = flag_value(args, "--db") {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("AI_CACHE_DB") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_DB)
}

fn open_store(args: &[String]) -> anyhow::Result<SqliteStreamStore> {
    let path = resolve_db(args);
    SqliteStreamStore::open(&path).with_context(|| format!("cannot open {}", path.display()))
}

async fn cmd_stats(args: &[String]) -> anyhow::Result<()> {
    let store = open_store(args)?;
    let owner = flag_value(args, "--owner");
    let stats = store.stats(owner).await?;

    if let Some(owner) = owner {
        println!("Owner:   {owner}");
    }
    println!("Total:   {}", stats.total);
    println!("Active:  {}", stats.active);
    println!("Expired: {}", stats.expired);
    Ok(())
}

async fn cmd_cleanup(args: &[String]) -> anyhow::Result<()> {
    let store = open_store(args)?;
    let removed = store.cleanup().await?;
    println!("Removed {removed} expired entr{}", if removed == 1 { "y" } else { "ies" });
    Ok(())
}

async fn cmd_clear(args: &[String]) -> anyhow::Result<()> {
    let store = open_store(args)?;
    let owner = flag_value(args, "--owner");
    let before = store.stats(owner).await?.total;
    store.clear(owner).await?;
    match owner {
        Some(owner) => println!("Cleared {before} entries owned by {owner}"),
        None => println!("Cleared {before} entries"),
    }
    Ok(())
}

async fn cmd_get(args: &[String]) -> anyhow::Result<()> {
    let Some(key) = positional(args).first().copied() else {
        bail!("usage: stream-cache-cli get <key>");
    };
    let store = open_store(args)?;

    let Some(entry) = store.entry(key).await? else {
        println!("Not found: {key}");
        std::process::exit(1);
    };
    let expired = entry.is_expired_at(chrono::Utc::now());
    println!("Key:        {}", entry.key);
    println!("Owner:      {}", entry.owner_id.as_deref().unwrap_or("-"));
    println!(
        "Expires at: {}{}",
        entry.expires_at.to_rfc3339(),
        if expired { " (expired)" } else { "" }
    );
    println!("Events:     {}", entry.value.len());
    println!("{}", serde_json::to_string_pretty(&entry.value)?);
    Ok(())
}

fn cmd_classify(args: &[String]) -> anyhow::Result<()> {
    let text = positional(args).join(" ");
    if text.is_empty() {
        bail!("usage: stream-cache-cli classify <text>");
    }
    let creative = is_creative_request(&[Message::user(text)]);
    println!("{}", if creative { "creative" } else { "factual" });
    Ok(())
}
