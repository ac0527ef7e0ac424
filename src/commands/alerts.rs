use anyhow::Result;
use famcal_core::store::Store;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::Render;

pub async fn run(app: &App, limit: usize) -> Result<()> {
    let messages = app.store.admin_messages().await?;

    if messages.is_empty() {
        println!("{}", "No alerts".dimmed());
        return Ok(());
    }

    let skip = messages.len().saturating_sub(limit);
    for message in messages.iter().skip(skip) {
        println!("{}", message.render());
    }

    Ok(())
}
