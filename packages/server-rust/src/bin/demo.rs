//! Plexus demo: builds a small realm tree, resolves services from several
//! vantage points, exercises a memoized method and runs the lifecycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use plexus_core::{hook, method, CacheOptions, CachingSpec, Sandbox, Selector, ServiceObject, Value};
use plexus_server::{Server, ServerConfig};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "plexus-demo")]
#[command(about = "Plexus realm tree and service resolution demo")]
#[command(version)]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(short, long, env = "PLEXUS_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `plexus_server=debug`.
    #[arg(long, env = "PLEXUS_LOG", default_value = "info")]
    log: String,

    /// Overrides the node id from the config file.
    #[arg(long)]
    node_id: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log, cli.json)?;

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_json_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }

    let server = Server::new(config);
    let root = server.root();
    root.register(
        ServiceObject::new()
            .name("shared")
            .property("greeting", json!("hello from the root realm"))
            .initialize(hook(|| async {
                info!("shared service initialized");
                Ok(())
            })),
    )?;

    let plugin = root.register_plugin("billing", json!({ "currency": "EUR" }))?;
    let generations = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&generations);
    plugin.register(
        ServiceObject::new()
            .name("rates")
            .method(
                "quote",
                method(move |args: Vec<Value>| {
                    let counter = Arc::clone(&counter);
                    async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        Ok(json!({ "symbol": args.first().cloned(), "generation": n }))
                    }
                }),
            )
            .with_caching(CachingSpec::new().method(
                "quote",
                CacheOptions::new(Duration::from_millis(500)).expires_in(Duration::from_secs(5)),
            ))?,
    )?;
    plugin.register(ServiceObject::new().name("ledger").sandbox(Sandbox::Plugin))?;

    server.start().await?;

    for (label, services) in [
        ("root (local)", root.services(Selector::Local)?),
        ("root (all)", root.services(true)?),
        ("billing (local)", plugin.services(Selector::Local)?),
        ("namespace billing", root.services("billing")?),
    ] {
        info!(view = label, services = ?services.names().collect::<Vec<_>>(), "resolved");
    }

    let rates = root
        .services(true)?
        .get("rates")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("rates service not visible from the root"))?;
    let (first, second) = tokio::join!(
        rates.call("quote", vec![json!("BTC")]),
        rates.call("quote", vec![json!("BTC")]),
    );
    let (first, second) = (first?, second?);
    info!(
        %first,
        %second,
        generations = generations.load(Ordering::SeqCst),
        "memoized calls"
    );

    server.stop().await?;
    Ok(())
}

fn init_tracing(filter: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder
            .json()
            .try_init()
            .map_err(|err| anyhow::anyhow!(err))?;
    } else {
        builder.try_init().map_err(|err| anyhow::anyhow!(err))?;
    }
    Ok(())
}
