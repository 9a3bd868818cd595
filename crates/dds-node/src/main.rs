//! # DDS Node
//!
//! Runs one overlay node over TCP.
//!
//! ## Startup Sequence
//!
//! 1. Load settings (file, then command-line overrides)
//! 2. Bind the TCP transport and join through the bootstrap peers
//! 3. Subscribe to every configured topic
//! 4. Log delivered events until Ctrl+C, then shut down

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dds_overlay::{
    Node, NodeSettings, OverlayEvent, Subscription, SubscriptionEvent, TcpTransport,
};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "dds-node", version, about = "Topic overlay node")]
struct Args {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen host (overrides the settings file)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides the settings file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Extra bootstrap peer, `host:port` (repeatable)
    #[arg(short, long = "bootstrap")]
    bootstrap: Vec<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_settings(args: &Args) -> Result<NodeSettings> {
    let mut settings = match &args.config {
        Some(path) => NodeSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => NodeSettings::default(),
    };
    if let Some(host) = &args.host {
        settings.host = host.clone();
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    settings.bootstrap.extend(args.bootstrap.iter().cloned());
    Ok(settings)
}

/// Log node lifecycle events in the background.
fn spawn_event_logger(node: &Node) {
    let mut events = node.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(OverlayEvent::Listening(addr)) => info!(%addr, "listening"),
                Ok(OverlayEvent::Ready { discovered }) => info!(discovered, "joined overlay"),
                Ok(OverlayEvent::Node(contact)) => {
                    info!(peer = %contact.id.short(), addr = %contact.addr, "new peer")
                }
                Ok(OverlayEvent::Warning(message)) => warn!("{message}"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Log what a subscription delivers in the background.
fn spawn_topic_logger(subscription: &Arc<Subscription>) {
    let mut events = subscription.events();
    let topic = subscription.name().to_string();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SubscriptionEvent::Event { data, from }) => {
                    let from = from.map(|f| f.id.short()).unwrap_or_else(|| "self".into());
                    info!(%topic, %from, %data, "event");
                }
                Ok(SubscriptionEvent::Remove) => info!(%topic, "unsubscribed"),
                Ok(SubscriptionEvent::Warning(message)) => warn!(%topic, "{message}"),
                Err(RecvError::Lagged(skipped)) => warn!(%topic, skipped, "topic log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log filter")?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = load_settings(&args)?;
    let bootstrap = settings
        .bootstrap_peers()
        .context("invalid bootstrap list")?;

    let transport = TcpTransport::new(settings.node_id(), settings.listen_addr());
    let node = Node::builder(Arc::new(transport))
        .config(settings.overlay.clone())
        .bootstrap(bootstrap)
        .build();
    info!(id = %node.id(), "starting node");

    spawn_event_logger(&node);
    node.listen().await.context("binding transport")?;
    node.wait_ready().await;

    let mut subscriptions = Vec::new();
    for topic in &settings.topics {
        let subscription = node
            .subscription(&topic.name, topic.role)
            .with_context(|| format!("registering topic {}", topic.name))?;
        spawn_topic_logger(&subscription);
        subscription.subscribe(|_, _| {}).await;
        info!(topic = %topic.name, role = ?topic.role, members = subscription.table().len(), "subscribed");
        subscriptions.push(subscription);
    }

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    // Graceful shutdown
    node.destroy().await;
    Ok(())
}
