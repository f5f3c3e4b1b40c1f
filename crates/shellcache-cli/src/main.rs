//! shellcache - offline cache worker host CLI.
//!
//! Drives the worker lifecycle the way a host page would: register the
//! worker once at startup (`install` + `activate`), then hand it
//! requests (`fetch`). `status` inspects the on-disk generations.

use std::io;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use shellcache_core::{
    CacheStore, CacheWorker, DiskStore, FetchDecision, FetchRequest, HttpFetcher, RequestKey,
    WorkerConfig,
};

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Set up logging with environment-based filter
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // SHELLCACHE_LOG_DIR redirects logging from stderr to a daily file
    if let Ok(dir) = std::env::var("SHELLCACHE_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(dir, "shellcache.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .with(filter)
            .init();
        return Some(guard);
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("init") => cmd_init(&args[2..]),
        Some("install") => cmd_install().await,
        Some("activate") => cmd_activate().await,
        Some("fetch") => cmd_fetch(&args[2..]).await,
        Some("status") => cmd_status().await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    eprintln!("shellcache - offline cache worker for installable web apps");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  shellcache init <origin> [--base <path>]   Write the worker configuration");
    eprintln!("  shellcache install                         Fetch and commit the precache set");
    eprintln!("  shellcache activate                        Evict stale generations, go active");
    eprintln!("  shellcache fetch <url|path> [--navigate]   Serve one request through the worker");
    eprintln!("  shellcache status                          Show generations and entry counts");
    eprintln!();
    eprintln!("Configuration is read from the config file, or from SHELLCACHE_ORIGIN.");
}

/// Load the saved configuration, falling back to SHELLCACHE_ORIGIN.
fn resolve_config() -> Result<WorkerConfig> {
    if let Some(config) = WorkerConfig::load()? {
        return Ok(config);
    }
    if let Ok(origin) = std::env::var("SHELLCACHE_ORIGIN") {
        let origin = Url::parse(&origin).context("SHELLCACHE_ORIGIN is not a valid URL")?;
        return Ok(WorkerConfig::new(origin));
    }
    anyhow::bail!("No configuration found. Run `shellcache init <origin>` or set SHELLCACHE_ORIGIN.")
}

fn build_worker(config: WorkerConfig) -> Result<CacheWorker<DiskStore, HttpFetcher>> {
    let store = DiskStore::new(config.store_root()?)?;
    let fetcher = HttpFetcher::new()?;
    Ok(CacheWorker::new(config, store, fetcher))
}

fn cmd_init(args: &[String]) -> Result<()> {
    let origin = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .context("Usage: shellcache init <origin> [--base <path>]")?;
    let origin = Url::parse(origin).context("Origin is not a valid URL")?;

    let mut config = WorkerConfig::new(origin);
    if let Some(pos) = args.iter().position(|a| a == "--base") {
        let base = args.get(pos + 1).context("--base requires a path")?;
        config = config.with_base_path(base);
    }

    config.save()?;
    println!("Wrote {}", WorkerConfig::config_path()?.display());
    Ok(())
}

async fn cmd_install() -> Result<()> {
    let config = resolve_config()?;
    let mut worker = build_worker(config)?;

    worker.install().await?;
    println!(
        "Installed generation {} ({} entries)",
        worker.generation(),
        worker.config().precache.len()
    );
    Ok(())
}

async fn cmd_activate() -> Result<()> {
    let config = resolve_config()?;
    let mut worker = build_worker(config)?;

    worker.activate().await?;
    println!("Active generation: {}", worker.generation());
    Ok(())
}

async fn cmd_fetch(args: &[String]) -> Result<()> {
    let target = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .context("Usage: shellcache fetch <url|path> [--navigate]")?;
    let navigate = args.iter().any(|a| a == "--navigate");

    let config = resolve_config()?;
    let url = if target.starts_with('/') {
        config.origin.join(target)?
    } else {
        Url::parse(target).context("Target is not a valid URL or path")?
    };

    let mut worker = build_worker(config)?;
    worker.activate().await?;

    let request = if navigate {
        FetchRequest::navigate(url)
    } else {
        FetchRequest::get(url)
    };

    info!(url = %request.url, navigate, "Serving request");
    match worker.handle_fetch(&request).await {
        FetchDecision::PassThrough => {
            println!("pass-through (not intercepted): {}", request.url);
        }
        FetchDecision::Served { response, source } => {
            println!(
                "{} {} {} bytes  {}",
                source,
                response.status,
                response.body.len(),
                request.url
            );
        }
    }

    // Let any background revalidation settle before the process exits
    worker.await_revalidations().await;
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let config = resolve_config()?;
    let store = DiskStore::new(config.store_root()?)?;

    let generations = store.generations().await?;
    if generations.is_empty() {
        println!("No cache generations (run `shellcache install`)");
        return Ok(());
    }

    for name in &generations {
        let count = store.keys(name).await?.len();
        let marker = if *name == config.generation {
            " (current)"
        } else {
            ""
        };
        println!("{}  {} entries{}", name, count, marker);
    }

    // Age of the app shell in the current generation
    let shell_key = RequestKey::new("GET", &config.shell_url()?);
    if let Some(shell) = store.get(&config.generation, &shell_key).await? {
        println!("shell cached {}", shell.age_display());
    }

    Ok(())
}
