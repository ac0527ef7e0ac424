//! Administrative alerts.
//!
//! Sync failures are never only logged: each one ends up as a persisted
//! [`AdminMessage`] and, when an admin user is configured, a push
//! notification. Delivery problems are logged and otherwise ignored so they
//! cannot mask the sync result that triggered them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// One or more calendars failed; the rest of the run went through
    Warning,
    /// The run itself failed
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A message in the admin inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminMessage {
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl AdminMessage {
    pub fn new(severity: Severity, title: impl Into<String>, body: impl Into<String>) -> Self {
        AdminMessage {
            id: Uuid::new_v4().to_string(),
            severity,
            title: title.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

/// Payload handed to a push dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

#[async_trait]
pub trait PushDispatcher: Send + Sync {
    async fn dispatch(&self, message: &PushMessage) -> CoreResult<()>;
}

/// Dispatcher that only writes to the log.
pub struct LogDispatcher;

#[async_trait]
impl PushDispatcher for LogDispatcher {
    async fn dispatch(&self, message: &PushMessage) -> CoreResult<()> {
        info!(user_id = %message.user_id, title = %message.title, "{}", message.body);
        Ok(())
    }
}

/// Dispatcher that POSTs each message as JSON to a push gateway.
pub struct HttpPushDispatcher {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpPushDispatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Notification(e.to_string()))?;

        Ok(HttpPushDispatcher {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl PushDispatcher for HttpPushDispatcher {
    async fn dispatch(&self, message: &PushMessage) -> CoreResult<()> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(message)
            .send()
            .await
            .map_err(|e| CoreError::Notification(format!("Failed to reach push endpoint: {}", e)))?;

        if !resp.status().is_success() {
            return Err(CoreError::Notification(format!(
                "Push endpoint returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// One calendar that failed during a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarFailure {
    pub calendar_id: String,
    pub message: String,
}

/// Routes admin alerts to the store and the push dispatcher.
#[derive(Clone)]
pub struct AdminAlerts {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn PushDispatcher>,
    admin_user_id: Option<String>,
}

impl AdminAlerts {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn PushDispatcher>,
        admin_user_id: Option<String>,
    ) -> Self {
        AdminAlerts {
            store,
            dispatcher,
            admin_user_id,
        }
    }

    /// Summarize the calendars that failed in one batch. No-op for an empty slice.
    pub async fn calendar_failures(&self, failures: &[CalendarFailure]) {
        if failures.is_empty() {
            return;
        }

        let title = match failures.len() {
            1 => "Calendar sync failed for 1 calendar".to_string(),
            n => format!("Calendar sync failed for {} calendars", n),
        };
        let body = failures
            .iter()
            .map(|f| format!("{}: {}", f.calendar_id, f.message))
            .collect::<Vec<_>>()
            .join("\n");

        let calendar_ids = failures
            .iter()
            .map(|f| f.calendar_id.as_str())
            .collect::<Vec<_>>()
            .join(",");

        self.send(
            AdminMessage::new(Severity::Warning, title, body),
            HashMap::from([("calendarIds".to_string(), calendar_ids)]),
        )
        .await;
    }

    /// The scheduled run could not do its job at all.
    pub async fn critical(&self, error: &CoreError) {
        error!("Critical sync failure: {}", error);
        let message = AdminMessage::new(
            Severity::Critical,
            "CRITICAL: scheduled calendar sync failed",
            error.to_string(),
        );
        self.send(message, HashMap::new()).await;
    }

    async fn send(&self, message: AdminMessage, mut data: HashMap<String, String>) {
        if let Err(e) = self.store.append_admin_message(&message).await {
            warn!("Could not store admin message: {}", e);
        }

        let Some(user_id) = &self.admin_user_id else {
            warn!(severity = %message.severity, title = %message.title, "No admin user configured; alert not pushed");
            return;
        };

        data.insert("type".to_string(), "admin_alert".to_string());
        data.insert("severity".to_string(), message.severity.to_string());
        data.insert("messageId".to_string(), message.id.clone());

        let push = PushMessage {
            user_id: user_id.clone(),
            title: message.title,
            body: message.body,
            data,
        };
        if let Err(e) = self.dispatcher.dispatch(&push).await {
            warn!(user_id = %user_id, "Could not push admin alert: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<PushMessage>>,
    }

    #[async_trait]
    impl PushDispatcher for RecordingDispatcher {
        async fn dispatch(&self, message: &PushMessage) -> CoreResult<()> {
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    struct FailingDispatcher;

    #[async_trait]
    impl PushDispatcher for FailingDispatcher {
        async fn dispatch(&self, _: &PushMessage) -> CoreResult<()> {
            Err(CoreError::Notification("gateway down".into()))
        }
    }

    fn failure(id: &str, message: &str) -> CalendarFailure {
        CalendarFailure {
            calendar_id: id.into(),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn test_failures_are_stored_and_pushed_to_admin() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let alerts = AdminAlerts::new(store.clone(), dispatcher.clone(), Some("admin-1".into()));

        alerts
            .calendar_failures(&[
                failure("swim", "fetching: HTTP 404"),
                failure("chess", "parsing: not a calendar"),
            ])
            .await;

        let messages = store.admin_messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].severity, Severity::Warning);
        assert!(messages[0].body.contains("swim: fetching: HTTP 404"));

        let sent = dispatcher.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, "admin-1");
        assert_eq!(sent[0].data["calendarIds"], "swim,chess");
        assert_eq!(sent[0].data["severity"], "warning");
    }

    #[tokio::test]
    async fn test_no_failures_sends_nothing() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let alerts = AdminAlerts::new(store.clone(), dispatcher.clone(), Some("admin-1".into()));

        alerts.calendar_failures(&[]).await;

        assert!(store.admin_messages().await.unwrap().is_empty());
        assert!(dispatcher.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_without_admin_user_only_stores() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let alerts = AdminAlerts::new(store.clone(), dispatcher.clone(), None);

        alerts.critical(&CoreError::Storage("disk full".into())).await;

        let messages = store.admin_messages().await.unwrap();
        assert_eq!(messages[0].severity, Severity::Critical);
        assert!(dispatcher.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_push_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        let alerts = AdminAlerts::new(store.clone(), Arc::new(FailingDispatcher), Some("admin-1".into()));

        alerts.critical(&CoreError::Timeout(540)).await;

        assert_eq!(store.admin_messages().await.unwrap().len(), 1);
    }
}
