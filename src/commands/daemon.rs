use anyhow::Result;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{error, info};

use crate::app::App;

pub async fn run(app: &App, once: bool) -> Result<()> {
    let engine = app.engine()?;

    if once {
        let response = engine.run_scheduled().await?;
        info!(
            succeeded = response.success_count,
            failed = response.error_count,
            "Scheduled sync finished"
        );
        return Ok(());
    }

    let schedule = app.config.schedule()?;
    info!(
        times = ?schedule.times(),
        timezone = %schedule.timezone(),
        "Sync daemon started"
    );

    loop {
        let now = Utc::now();
        let next = schedule.next_after(now);
        let wait = (next - now).to_std().unwrap_or_default();

        info!(
            "Next sync scheduled for {} (in {})",
            next.with_timezone(&schedule.timezone()),
            humantime::format_duration(std::time::Duration::from_secs(wait.as_secs()))
        );

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
            _ = sleep(wait) => {}
        }

        match engine.run_scheduled().await {
            Ok(response) => info!(
                total = response.total_count,
                succeeded = response.success_count,
                failed = response.error_count,
                "Scheduled sync finished"
            ),
            // Already alerted; the next slot retries
            Err(e) => error!("Scheduled sync failed: {}", e),
        }
    }
}
