use anyhow::Result;
use chrono::Utc;
use famcal_core::month::MonthKey;
use famcal_core::store::Store;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::{Render, render_event};

pub async fn run(app: &App, calendar_id: &str, month: Option<&str>) -> Result<()> {
    let calendar = app.calendar(calendar_id).await?;
    let tz = app.home_tz()?;
    let month = match month {
        Some(m) => m.parse::<MonthKey>()?,
        None => MonthKey::of(Utc::now()),
    };

    println!("{} {}", calendar.render(), month.to_string().dimmed());

    let Some(bucket) = app.store.load_month(&calendar.id, month).await? else {
        println!("   {}", "No events".dimmed());
        return Ok(());
    };

    let mut events: Vec<_> = bucket.events.values().collect();
    events.sort_by_key(|e| e.start_time);

    if events.is_empty() {
        println!("   {}", "No events".dimmed());
        return Ok(());
    }

    let mut current_date = None;
    for event in events {
        let date = if event.is_all_day {
            event.start_time.date_naive()
        } else {
            event.start_time.with_timezone(&tz).date_naive()
        };

        if current_date != Some(date) {
            println!();
            println!("{}", date.format("%a %b %-d").bold());
            current_date = Some(date);
        }
        println!("{}", render_event(event, tz));
    }

    Ok(())
}
