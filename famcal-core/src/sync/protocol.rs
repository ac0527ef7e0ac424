//! Request and response types for sync invocations.

use serde::{Deserialize, Serialize};

use crate::calendar::CalendarSource;

/// Sync one calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub calendar_id: String,
    /// Overrides the stored source for this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CalendarSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months_back: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months_forward: Option<u32>,
}

impl SyncRequest {
    pub fn new(calendar_id: impl Into<String>) -> Self {
        SyncRequest {
            calendar_id: calendar_id.into(),
            source: None,
            months_back: None,
            months_forward: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub event_count: usize,
    pub months_covered: usize,
    pub created_count: usize,
    pub preserved_activities_count: usize,
    pub deleted_events_count: usize,
    pub updated_event_ids_count: usize,
}

impl SyncResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        SyncResponse {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// One calendar in a batch request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTarget {
    pub calendar_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CalendarSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncRequest {
    pub calendars: Vec<SyncTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months_back: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months_forward: Option<u32>,
}

impl BatchSyncRequest {
    pub fn for_calendars<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BatchSyncRequest {
            calendars: ids
                .into_iter()
                .map(|id| SyncTarget {
                    calendar_id: id.into(),
                    source: None,
                })
                .collect(),
            months_back: None,
            months_forward: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSyncOutcome {
    pub calendar_id: String,
    #[serde(flatten)]
    pub response: SyncResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResponse {
    pub total_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub results: Vec<CalendarSyncOutcome>,
}

impl From<Vec<CalendarSyncOutcome>> for BatchSyncResponse {
    fn from(results: Vec<CalendarSyncOutcome>) -> Self {
        let success_count = results.iter().filter(|r| r.response.success).count();
        BatchSyncResponse {
            total_count: results.len(),
            success_count,
            error_count: results.len() - success_count,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_minimal_json() {
        let req: SyncRequest = serde_json::from_str(r#"{"calendarId": "swim"}"#).unwrap();
        assert_eq!(req, SyncRequest::new("swim"));
    }

    #[test]
    fn test_request_with_source_override() {
        let req: SyncRequest = serde_json::from_str(
            r#"{"calendarId": "swim", "source": {"type": "ical", "url": "webcal://x/y.ics"}, "monthsForward": 6}"#,
        )
        .unwrap();
        assert_eq!(
            req.source,
            Some(CalendarSource::Ical {
                url: "webcal://x/y.ics".into()
            })
        );
        assert_eq!(req.months_forward, Some(6));
    }

    #[test]
    fn test_response_field_names() {
        let json = serde_json::to_value(SyncResponse {
            success: true,
            event_count: 8,
            updated_event_ids_count: 1,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json["eventCount"], 8);
        assert_eq!(json["updatedEventIdsCount"], 1);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_batch_response_counts_outcomes() {
        let batch = BatchSyncResponse::from(vec![
            CalendarSyncOutcome {
                calendar_id: "a".into(),
                response: SyncResponse {
                    success: true,
                    ..Default::default()
                },
            },
            CalendarSyncOutcome {
                calendar_id: "b".into(),
                response: SyncResponse::failed("fetching: HTTP 500"),
            },
        ]);
        assert_eq!((batch.total_count, batch.success_count, batch.error_count), (2, 1, 1));

        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["results"][1]["calendarId"], "b");
        assert_eq!(json["results"][1]["success"], false);
    }
}
