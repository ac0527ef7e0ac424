use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use famcal_core::manual::{ManualEvent, create_manual_event};
use owo_colors::OwoColorize;

use crate::app::App;

pub async fn run(
    app: &App,
    calendar_id: &str,
    title: String,
    start: &str,
    duration: &str,
    location: Option<String>,
) -> Result<()> {
    let calendar = app.calendar(calendar_id).await?;
    let tz = app.home_tz()?;

    let (start, end, is_all_day) = if let Ok(date) = NaiveDate::parse_from_str(start, "%Y-%m-%d") {
        let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
        (start, start + chrono::Duration::days(1), true)
    } else {
        let local = NaiveDateTime::parse_from_str(start, "%Y-%m-%dT%H:%M").with_context(|| {
            format!("Invalid start '{}'. Use YYYY-MM-DDTHH:MM or YYYY-MM-DD", start)
        })?;
        let start = tz
            .from_local_datetime(&local)
            .earliest()
            .with_context(|| format!("{} does not exist in {}", local, tz))?
            .with_timezone(&Utc);
        let length = humantime::parse_duration(duration)
            .with_context(|| format!("Invalid duration '{}'", duration))?;
        (start, start + chrono::Duration::from_std(length)?, false)
    };

    let event = ManualEvent {
        title: title.clone(),
        description: None,
        location: location.filter(|l| !l.is_empty()),
        start,
        end,
        is_all_day,
        activities: Vec::new(),
        reminders: None,
    };

    let id = create_manual_event(app.store.as_ref(), &calendar.id, event).await?;

    println!("{} {} {}", "Created".green(), title, format!("({})", id).dimmed());
    Ok(())
}
