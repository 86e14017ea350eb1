use anyhow::{Context, Result};
use slotwatch::booking::Transactor;
use slotwatch::config::{AccountConfig, Settings};
use slotwatch::poller::Poller;
use slotwatch::portal::PortalClient;
use slotwatch::scheduler::qualifying_dates;
use slotwatch::session::SessionManager;
use slotwatch::utils::mask;
use std::path::PathBuf;

pub async fn check(
    settings: Settings,
    path: PathBuf,
    interactive: bool,
    limit: usize,
) -> Result<()> {
    let mut account = AccountConfig::load(&path)
        .with_context(|| format!("Failed to load account {}", path.display()))?;

    let client = PortalClient::for_country(&settings, &account.country)?;
    let mut session =
        SessionManager::new(client, account.email.clone(), account.password.clone());
    let resolver = super::resolver(interactive);

    println!("Checking {}", mask(&account.email));
    println!("=========");

    session.ensure_authenticated().await.context("Login failed")?;
    let schedule_id = resolver.resolve_schedule(&mut session, &mut account).await?;
    session.bind_schedule(&schedule_id).await?;
    let facility_id = resolver
        .resolve_primary(&mut session, &mut account, &schedule_id)
        .await?;
    let secondary = if account.need_secondary {
        Some(
            resolver
                .resolve_secondary(&mut session, &mut account, &schedule_id)
                .await?,
        )
    } else {
        None
    };

    let snapshot = Transactor::new(schedule_id.as_str(), facility_id.as_str(), secondary.clone())
        .read_snapshot(&mut session)
        .await?;
    let dates = Poller::new(schedule_id.as_str())
        .available_dates(&mut session, &facility_id, None)
        .await?;
    let bounds = account.bounds();
    let qualifying = qualifying_dates(&dates, bounds, snapshot.date());

    println!("  Schedule:           {schedule_id}");
    println!("  Facility:           {facility_id}");
    if let Some(secondary) = &secondary {
        println!("  Secondary facility: {secondary}");
    }
    println!("  Current:            {}", snapshot.display());
    let max = bounds
        .max
        .map(|d| d.to_string())
        .unwrap_or_else(|| "any".to_string());
    println!("  Window:             after {} up to {max}", bounds.min);
    println!("  Available dates:    {}", dates.len());
    for date in dates.iter().take(limit) {
        let marker = if qualifying.contains(date) { "*" } else { " " };
        println!("    {marker} {date}");
    }
    println!("  Qualifying dates:   {}", qualifying.len());
    Ok(())
}
