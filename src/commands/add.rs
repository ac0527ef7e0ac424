use anyhow::{Result, bail};
use famcal_core::calendar::{Calendar, CalendarSource};
use famcal_core::store::Store;
use owo_colors::OwoColorize;

use crate::app::App;
use crate::render::Render;

pub async fn run(
    app: &App,
    id: String,
    url: Option<String>,
    google: Option<String>,
    local: bool,
    name: Option<String>,
    subscribers: Vec<String>,
) -> Result<()> {
    let source = match (url, google, local) {
        (Some(url), None, false) => CalendarSource::Ical { url },
        (None, Some(external_id), false) => CalendarSource::Google { external_id },
        (None, None, true) => CalendarSource::Local,
        _ => bail!("Pass exactly one of --url, --google or --local"),
    };

    if slug::slugify(&id) != id {
        bail!(
            "Calendar id '{}' must be lowercase letters, digits and dashes (try '{}')",
            id,
            slug::slugify(&id)
        );
    }

    if app.store.get_calendar(&id).await?.is_some() {
        bail!("Calendar '{}' already exists", id);
    }

    let mut calendar = Calendar::new(&id, source);
    calendar.name = name;
    calendar.subscribers = subscribers;
    app.store.put_calendar(&calendar).await?;

    println!("{} {}", "Added".green(), calendar.render());
    if calendar.source.is_sync_eligible() {
        println!("\nSync it with:\n  famcal sync -c {}", calendar.id);
    }

    Ok(())
}
