//! Wiring of config, storage and the sync engine for CLI commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use famcal_core::alert::{AdminAlerts, HttpPushDispatcher, LogDispatcher, PushDispatcher};
use famcal_core::calendar::Calendar;
use famcal_core::config::FamcalConfig;
use famcal_core::feed::HttpFeedFetcher;
use famcal_core::store::{FileStore, Store};
use famcal_core::sync::SyncEngine;

pub struct App {
    pub config: FamcalConfig,
    pub store: Arc<FileStore>,
}

impl App {
    pub fn load() -> Result<Self> {
        let config = FamcalConfig::load().context("Failed to load configuration")?;
        let store = Arc::new(FileStore::new(config.data_path()));
        Ok(App { config, store })
    }

    pub fn home_tz(&self) -> Result<Tz> {
        Ok(self.config.home_tz()?)
    }

    pub fn engine(&self) -> Result<SyncEngine> {
        let fetcher = HttpFeedFetcher::new(self.config.fetch_timeout()?)?;

        let dispatcher: Arc<dyn PushDispatcher> = match &self.config.push_endpoint {
            Some(endpoint) => Arc::new(HttpPushDispatcher::new(
                endpoint.clone(),
                self.config.fetch_timeout()?,
            )?),
            None => Arc::new(LogDispatcher),
        };
        let alerts = AdminAlerts::new(
            self.store.clone(),
            dispatcher,
            self.config.admin_user_id.clone(),
        );

        Ok(SyncEngine::new(
            self.store.clone(),
            Arc::new(fetcher),
            alerts,
            self.config.sync_settings()?,
        ))
    }

    pub async fn calendar(&self, id: &str) -> Result<Calendar> {
        if let Some(calendar) = self.store.get_calendar(id).await? {
            return Ok(calendar);
        }

        let available: Vec<_> = self
            .store
            .list_calendars()
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        if available.is_empty() {
            anyhow::bail!(
                "Calendar '{}' not found.\n\n\
                Add your first calendar with:\n  \
                famcal add <id> --url <feed-url>",
                id
            );
        }
        anyhow::bail!(
            "Calendar '{}' not found. Available: {}",
            id,
            available.join(", ")
        );
    }
}
