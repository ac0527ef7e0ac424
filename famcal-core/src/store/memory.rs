//! In-memory [`Store`], used by tests and dry runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Store, WriteBatch};
use crate::alert::AdminMessage;
use crate::calendar::Calendar;
use crate::error::{CoreError, CoreResult};
use crate::month::{MonthBucket, MonthKey};

#[derive(Default)]
struct Inner {
    calendars: BTreeMap<String, Calendar>,
    buckets: HashMap<String, BTreeMap<MonthKey, MonthBucket>>,
    admin_messages: Vec<AdminMessage>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with calendars
    pub async fn with_calendars(calendars: impl IntoIterator<Item = Calendar>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write().await;
            for calendar in calendars {
                inner.calendars.insert(calendar.id.clone(), calendar);
            }
        }
        store
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_calendars(&self) -> CoreResult<Vec<Calendar>> {
        Ok(self.inner.read().await.calendars.values().cloned().collect())
    }

    async fn get_calendar(&self, id: &str) -> CoreResult<Option<Calendar>> {
        Ok(self.inner.read().await.calendars.get(id).cloned())
    }

    async fn put_calendar(&self, calendar: &Calendar) -> CoreResult<()> {
        self.inner
            .write()
            .await
            .calendars
            .insert(calendar.id.clone(), calendar.clone());
        Ok(())
    }

    async fn load_month(&self, calendar_id: &str, month: MonthKey) -> CoreResult<Option<MonthBucket>> {
        let inner = self.inner.read().await;
        Ok(inner
            .buckets
            .get(calendar_id)
            .and_then(|months| months.get(&month))
            .cloned())
    }

    async fn load_months(&self, calendar_id: &str) -> CoreResult<Vec<MonthBucket>> {
        let inner = self.inner.read().await;
        Ok(inner
            .buckets
            .get(calendar_id)
            .map(|months| months.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn commit(&self, batch: WriteBatch) -> CoreResult<()> {
        // One write guard for the whole batch
        let mut inner = self.inner.write().await;
        let Inner {
            calendars, buckets, ..
        } = &mut *inner;

        let calendar = calendars
            .get_mut(&batch.calendar_id)
            .ok_or_else(|| CoreError::CalendarNotFound(batch.calendar_id.clone()))?;

        let months = buckets.entry(batch.calendar_id.clone()).or_default();
        for bucket in batch.buckets {
            months.insert(bucket.month, bucket);
        }
        if let Some(status) = &batch.status {
            status.apply_to(calendar);
        }
        Ok(())
    }

    async fn append_admin_message(&self, message: &AdminMessage) -> CoreResult<()> {
        self.inner.write().await.admin_messages.push(message.clone());
        Ok(())
    }

    async fn admin_messages(&self) -> CoreResult<Vec<AdminMessage>> {
        Ok(self.inner.read().await.admin_messages.clone())
    }
}
