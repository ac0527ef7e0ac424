use anyhow::{Result, bail};
use famcal_core::store::Store;
use famcal_core::sync::{BatchSyncRequest, SyncRequest};
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::{Render, pluralize};
use crate::utils::tui;

pub async fn run(
    app: &App,
    calendar_ids: Vec<String>,
    months_back: Option<u32>,
    months_forward: Option<u32>,
    json: bool,
) -> Result<()> {
    let engine = app.engine()?;

    if let [calendar_id] = calendar_ids.as_slice() {
        let calendar = app.calendar(calendar_id).await?;

        let spinner = tui::create_spinner(calendar.render());
        let response = engine
            .sync_calendar(SyncRequest {
                calendar_id: calendar.id.clone(),
                source: None,
                months_back,
                months_forward,
            })
            .await;
        spinner.finish_and_clear();

        if json {
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else {
            println!("{}", calendar.render());
            println!("{}", response.render());
        }

        if !response.success {
            bail!("Sync failed");
        }
        return Ok(());
    }

    let calendar_ids = if calendar_ids.is_empty() {
        app.store
            .list_calendars()
            .await?
            .into_iter()
            .filter(|c| c.source.is_sync_eligible())
            .map(|c| c.id)
            .collect()
    } else {
        calendar_ids
    };

    if calendar_ids.is_empty() {
        println!("{}", "No calendars with a feed to sync.".dimmed());
        return Ok(());
    }

    let mut request = BatchSyncRequest::for_calendars(calendar_ids);
    request.months_back = months_back;
    request.months_forward = months_forward;

    let spinner = tui::create_spinner(format!(
        "Syncing {} {}",
        request.calendars.len(),
        pluralize("calendar", request.calendars.len())
    ));
    let response = engine.sync_batch(request).await;
    spinner.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        for (i, outcome) in response.results.iter().enumerate() {
            println!("📅 {}", outcome.calendar_id);
            println!("{}", outcome.response.render());
            if i < response.results.len() - 1 {
                println!();
            }
        }
        println!(
            "\nSynced {} of {} {}",
            response.success_count,
            response.total_count,
            pluralize("calendar", response.total_count)
        );
    }

    if response.error_count > 0 {
        bail!(
            "{} {} failed",
            response.error_count,
            pluralize("calendar", response.error_count)
        );
    }
    Ok(())
}
