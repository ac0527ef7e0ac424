use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use famcal_core::manual::{EventTemplate, apply_template};
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::pluralize;

pub async fn run(app: &App, calendar_id: &str, path: &Path, date: &str) -> Result<()> {
    let calendar = app.calendar(calendar_id).await?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date))?;
    let template = EventTemplate::load(path)
        .await
        .with_context(|| format!("Could not load template {}", path.display()))?;

    let ids = apply_template(app.store.as_ref(), &calendar.id, &template, date, app.home_tz()?).await?;

    println!(
        "{} '{}': {} {} added to {}",
        "Applied".green(),
        template.name,
        ids.len(),
        pluralize("event", ids.len()),
        calendar.id
    );
    Ok(())
}
