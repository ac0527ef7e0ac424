use anyhow::Result;
use famcal_core::store::Store;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::{Render, render_status};

pub async fn run(app: &App) -> Result<()> {
    let calendars = app.store.list_calendars().await?;

    if calendars.is_empty() {
        println!("{}", "No calendars yet.".dimmed());
        println!("\nAdd one with:\n  famcal add <id> --url <feed-url>");
        return Ok(());
    }

    for (i, calendar) in calendars.iter().enumerate() {
        println!("{} {}", calendar.render(), calendar.source.to_string().dimmed());
        println!("{}", render_status(calendar));

        if i < calendars.len() - 1 {
            println!();
        }
    }

    Ok(())
}
