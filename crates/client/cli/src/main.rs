//! Runs a scripted encounter and prints every combat event as a JSON line.
mod config;
mod encounter;

use anyhow::{Context, Result};
use combat_content::{AbilityCatalog, ConditionCatalog, ConfigLoader};
use combat_runtime::{Event, Runtime, RuntimeConfig, Topic};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::CliConfig;
use encounter::Encounter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (silently ignore if not found)
    let _ = dotenvy::dotenv();

    setup_logging();
    let config = CliConfig::from_env();

    let combat = match &config.combat_config {
        Some(path) => ConfigLoader::load(path)?,
        None => ConfigLoader::embedded()?,
    };
    let conditions = ConditionCatalog::load()?;
    let abilities = AbilityCatalog::load()?;
    let granted: Vec<_> = abilities.ids().cloned().collect();

    let runtime = Runtime::builder()
        .config(RuntimeConfig {
            combat,
            event_buffer_size: config.event_buffer,
            seed: config.seed,
            ..RuntimeConfig::default()
        })
        .conditions(conditions)
        .abilities(abilities)
        .build()
        .await
        .context("starting runtime")?;
    tracing::info!(seed = runtime.seed(), duration_ms = config.duration.as_millis() as u64, "encounter starting");

    let printers: Vec<JoinHandle<()>> = runtime
        .handle()
        .subscribe_multiple(&Topic::ALL)
        .into_values()
        .map(|rx| tokio::spawn(print_events(rx)))
        .collect();

    let encounter = Encounter::setup(runtime.handle(), granted).await?;
    encounter.run(config.duration).await?;

    for snapshot in encounter.snapshots().await? {
        tracing::info!(
            entity = %snapshot.id,
            alive = snapshot.alive,
            health = snapshot.attribute(combat_core::Stat::Health),
            conditions = snapshot.conditions.len(),
            "final state"
        );
    }

    drop(encounter);
    runtime.shutdown().await?;

    // Every sender is gone now; printers finish once their queues drain.
    for printer in printers {
        printer.await.context("event printer panicked")?;
    }
    Ok(())
}

async fn print_events(mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => match event.to_json() {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(target: "runtime::events", event = event.name(), error = %e, "unserializable event"),
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(target: "runtime::events", skipped, "event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Logs go to stderr so stdout carries only event lines.
fn setup_logging() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}
