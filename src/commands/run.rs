use anyhow::{bail, Context, Result};
use slotwatch::config::{AccountConfig, Settings};
use slotwatch::notifications::NotificationManager;
use slotwatch::scheduler::{EngineState, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run(settings: Settings, accounts: Vec<PathBuf>, interactive: bool) -> Result<()> {
    let notifier = NotificationManager::from_settings(&settings.notifications)
        .context("Failed to set up notification channels")?;
    tracing::info!(channels = ?notifier.channel_names(), "Notifications ready");

    let mut supervisor =
        Supervisor::new(settings, Arc::new(notifier)).with_resolver(super::resolver(interactive));

    for path in &accounts {
        let account = AccountConfig::load(path)
            .with_context(|| format!("Failed to load account {}", path.display()))?;
        supervisor
            .start(account)
            .with_context(|| format!("Failed to start account {}", path.display()))?;
    }

    let stopper = supervisor.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping all accounts");
            stopper.stop_all();
        }
    });

    let results = supervisor.join_all().await;

    println!();
    println!("Results");
    println!("=======");
    for (account, state) in &results {
        println!("  {account}: {state}");
    }

    if results.iter().any(|(_, state)| *state == EngineState::Fatal) {
        bail!("one or more accounts stopped on a fatal error");
    }
    Ok(())
}
