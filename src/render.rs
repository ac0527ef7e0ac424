//! Colored terminal rendering for famcal-core types.

use chrono_tz::Tz;
use famcal_core::alert::{AdminMessage, Severity};
use famcal_core::calendar::{Calendar, SyncStatus};
use famcal_core::event::{EventOrigin, StoredEvent};
use famcal_core::sync::SyncResponse;
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for Calendar {
    fn render(&self) -> String {
        let title = format!("📅 {}", self.display_name());
        match &self.name {
            Some(_) => format!("{} {}", title, format!("({})", self.id).dimmed()),
            None => title,
        }
    }
}

/// One-line summary of a calendar's last sync
pub fn render_status(calendar: &Calendar) -> String {
    let when = calendar
        .last_synced_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default();

    match calendar.sync_status {
        SyncStatus::Never => format!("   {}", "never synced".dimmed()),
        SyncStatus::Success => format!(
            "   {} {} {}",
            "✓".green(),
            format!(
                "{} {} in {} {}",
                calendar.counters.event_count,
                pluralize("event", calendar.counters.event_count),
                calendar.counters.months_covered,
                pluralize("month", calendar.counters.months_covered),
            ),
            when.dimmed()
        ),
        SyncStatus::Error => format!(
            "   {} {} {}",
            "✗".red(),
            calendar.last_error.as_deref().unwrap_or("unknown error").red(),
            when.dimmed()
        ),
    }
}

impl Render for SyncResponse {
    fn render(&self) -> String {
        if !self.success {
            return format!("   {}", self.message.as_deref().unwrap_or("Sync failed").red());
        }

        let mut parts = vec![format!(
            "{} {} in {} {}",
            self.event_count,
            pluralize("event", self.event_count),
            self.months_covered,
            pluralize("month", self.months_covered)
        )];
        if self.created_count > 0 {
            parts.push(format!("+{} new", self.created_count).green().to_string());
        }
        if self.updated_event_ids_count > 0 {
            parts.push(format!("~{} moved", self.updated_event_ids_count).yellow().to_string());
        }
        if self.deleted_events_count > 0 {
            parts.push(format!("-{} removed", self.deleted_events_count).red().to_string());
        }
        if self.preserved_activities_count > 0 {
            parts.push(
                format!("{} with activities kept", self.preserved_activities_count)
                    .dimmed()
                    .to_string(),
            );
        }
        format!("   {}", parts.join(", "))
    }
}

impl Render for AdminMessage {
    fn render(&self) -> String {
        let severity = match self.severity {
            Severity::Warning => "warning".yellow().to_string(),
            Severity::Critical => "critical".red().bold().to_string(),
        };
        format!(
            "{} {} {}\n{}",
            self.created_at.format("%Y-%m-%d %H:%M").dimmed(),
            severity,
            self.title.bold(),
            self.body
                .lines()
                .map(|l| format!("   {}", l))
                .collect::<Vec<_>>()
                .join("\n")
        )
    }
}

/// An event line in the given timezone
pub fn render_event(event: &StoredEvent, tz: Tz) -> String {
    let time = if event.is_all_day {
        format!("{:>7}", "all-day")
    } else {
        format!("{:>7}", event.start_time.with_timezone(&tz).format("%H:%M"))
    };

    let mut line = format!("  {} {}", time, event.title);
    if let Some(location) = &event.location {
        line.push_str(&format!(" {}", format!("@ {}", location).dimmed()));
    }
    if !event.activities.is_empty() {
        let label = format!(
            "[{} {}]",
            event.activities.len(),
            pluralize("activity", event.activities.len())
        );
        line.push_str(&format!(" {}", label.cyan()));
    }
    match event.origin {
        EventOrigin::Feed => {}
        EventOrigin::Manual => line.push_str(&format!(" {}", "(manual)".dimmed())),
        EventOrigin::Template => line.push_str(&format!(" {}", "(template)".dimmed())),
    }
    line
}

/// Simple pluralization helper
pub fn pluralize(word: &str, count: usize) -> &str {
    if count == 1 {
        word
    } else {
        match word {
            "event" => "events",
            "month" => "months",
            "activity" => "activities",
            "calendar" => "calendars",
            _ => word,
        }
    }
}
