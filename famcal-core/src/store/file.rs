//! JSON-on-disk [`Store`].
//!
//! ```text
//! <data_dir>/
//!   <calendar_id>/calendar.json
//!   <calendar_id>/months/<yyyy-MM>.json
//!   admin/messages.jsonl
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::{Store, WriteBatch};
use crate::alert::AdminMessage;
use crate::calendar::Calendar;
use crate::error::{CoreError, CoreResult};
use crate::month::{MonthBucket, MonthKey};

const CALENDAR_FILE: &str = "calendar.json";
const MONTHS_DIR: &str = "months";
const ADMIN_DIR: &str = "admin";
const ADMIN_MESSAGES_FILE: &str = "messages.jsonl";

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStore { root: root.into() }
    }

    fn calendar_dir(&self, id: &str) -> CoreResult<PathBuf> {
        let valid = !id.is_empty()
            && id != ADMIN_DIR
            && !id.starts_with('.')
            && !id.contains(['/', '\\']);
        if !valid {
            return Err(CoreError::Storage(format!("Invalid calendar id '{}'", id)));
        }
        Ok(self.root.join(id))
    }

    fn month_path(&self, calendar_id: &str, month: MonthKey) -> CoreResult<PathBuf> {
        Ok(self
            .calendar_dir(calendar_id)?
            .join(MONTHS_DIR)
            .join(format!("{}.json", month)))
    }

    fn admin_messages_path(&self) -> PathBuf {
        self.root.join(ADMIN_DIR).join(ADMIN_MESSAGES_FILE)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> CoreResult<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
            CoreError::Storage(format!("Corrupt record {}: {}", path.display(), e))
        })?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn temp_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

fn backup_path(path: &Path) -> PathBuf {
    sibling_path(path, ".bak")
}

/// Write `value` next to `path` as a temp file and return the temp path.
async fn stage<T: Serialize>(path: &Path, value: &T) -> CoreResult<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let temp = temp_path(path);
    let content = serde_json::to_vec_pretty(value)?;
    fs::write(&temp, content).await?;
    Ok(temp)
}

async fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (temp, _) in staged {
        if let Err(e) = fs::remove_file(temp).await {
            warn!(path = %temp.display(), "Could not remove staged file: {}", e);
        }
    }
}

/// A staged file moved into place, and where its predecessor was parked.
struct Promoted {
    path: PathBuf,
    backup: Option<PathBuf>,
}

/// Move `temp` over `path`, parking any live file as `<path>.bak` first.
async fn promote(temp: &Path, path: &Path) -> CoreResult<Promoted> {
    let backup = backup_path(path);
    let parked = match fs::rename(path, &backup).await {
        Ok(()) => Some(backup),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = fs::rename(temp, path).await {
        if let Some(backup) = &parked {
            if let Err(restore) = fs::rename(backup, path).await {
                warn!(path = %path.display(), "Could not restore previous file: {}", restore);
            }
        }
        return Err(e.into());
    }

    Ok(Promoted {
        path: path.to_path_buf(),
        backup: parked,
    })
}

/// Put every promoted path back the way it was, newest first.
async fn roll_back(promoted: &[Promoted]) {
    for done in promoted.iter().rev() {
        let result = match &done.backup {
            Some(backup) => fs::rename(backup, &done.path).await,
            None => fs::remove_file(&done.path).await,
        };
        if let Err(e) = result {
            warn!(path = %done.path.display(), "Could not roll back file: {}", e);
        }
    }
}

#[async_trait]
impl Store for FileStore {
    async fn list_calendars(&self) -> CoreResult<Vec<Calendar>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut calendars = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path().join(CALENDAR_FILE);
            if let Some(calendar) = read_json::<Calendar>(&path).await? {
                calendars.push(calendar);
            }
        }

        calendars.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(calendars)
    }

    async fn get_calendar(&self, id: &str) -> CoreResult<Option<Calendar>> {
        read_json(&self.calendar_dir(id)?.join(CALENDAR_FILE)).await
    }

    async fn put_calendar(&self, calendar: &Calendar) -> CoreResult<()> {
        let path = self.calendar_dir(&calendar.id)?.join(CALENDAR_FILE);
        let temp = stage(&path, calendar).await?;
        fs::rename(&temp, &path).await?;
        Ok(())
    }

    async fn load_month(&self, calendar_id: &str, month: MonthKey) -> CoreResult<Option<MonthBucket>> {
        read_json(&self.month_path(calendar_id, month)?).await
    }

    async fn load_months(&self, calendar_id: &str) -> CoreResult<Vec<MonthBucket>> {
        let dir = self.calendar_dir(calendar_id)?.join(MONTHS_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut buckets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(bucket) = read_json::<MonthBucket>(&path).await? {
                    buckets.push(bucket);
                }
            }
        }

        buckets.sort_by_key(|b| b.month);
        Ok(buckets)
    }

    async fn commit(&self, batch: WriteBatch) -> CoreResult<()> {
        let calendar_path = self.calendar_dir(&batch.calendar_id)?.join(CALENDAR_FILE);
        let mut calendar: Calendar = read_json(&calendar_path)
            .await?
            .ok_or_else(|| CoreError::CalendarNotFound(batch.calendar_id.clone()))?;

        // Stage every file before touching any live one
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
        for bucket in &batch.buckets {
            let path = self.month_path(&batch.calendar_id, bucket.month)?;
            match stage(&path, bucket).await {
                Ok(temp) => staged.push((temp, path)),
                Err(e) => {
                    discard(&staged).await;
                    return Err(e);
                }
            }
        }
        if let Some(status) = &batch.status {
            status.apply_to(&mut calendar);
            match stage(&calendar_path, &calendar).await {
                Ok(temp) => staged.push((temp, calendar_path)),
                Err(e) => {
                    discard(&staged).await;
                    return Err(e);
                }
            }
        }

        // Buckets land first, the calendar record last
        let mut promoted = Vec::with_capacity(staged.len());
        for (i, (temp, path)) in staged.iter().enumerate() {
            match promote(temp, path).await {
                Ok(done) => promoted.push(done),
                Err(e) => {
                    discard(&staged[i..]).await;
                    roll_back(&promoted).await;
                    return Err(e);
                }
            }
        }

        for done in &promoted {
            if let Some(backup) = &done.backup {
                if let Err(e) = fs::remove_file(backup).await {
                    warn!(path = %backup.display(), "Could not remove backup file: {}", e);
                }
            }
        }
        Ok(())
    }

    async fn append_admin_message(&self, message: &AdminMessage) -> CoreResult<()> {
        let path = self.admin_messages_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn admin_messages(&self) -> CoreResult<Vec<AdminMessage>> {
        let content = match fs::read_to_string(self.admin_messages_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(CoreError::from))
            .collect()
    }
}
