//! Exercise session log.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::core::{Observer, ObserverManifest};
use crate::domain::{DateRange, Entry};

use super::{load_json, local_date, range_covers, save_json, ValidationError};

/// One logged session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub category: String,
    pub duration_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// Input for [`SessionLog::log`]
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub category: String,
    pub duration_minutes: f64,
    pub note: Option<String>,
    pub at: Option<DateTime<Utc>>,
}

impl NewSession {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.category.trim().is_empty() {
            return Err(ValidationError::Missing("category"));
        }
        if !self.duration_minutes.is_finite() || self.duration_minutes <= 0.0 {
            return Err(ValidationError::NotPositive {
                field: "duration_minutes",
                value: self.duration_minutes,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    sessions: Vec<Session>,
}

pub struct SessionLog {
    path: Option<PathBuf>,
    offset: FixedOffset,
    sessions: RwLock<Vec<Session>>,
}

impl SessionLog {
    pub fn in_memory(offset: FixedOffset) -> Self {
        Self {
            path: None,
            offset,
            sessions: RwLock::new(Vec::new()),
        }
    }

    pub async fn load(path: PathBuf, offset: FixedOffset) -> Result<Self> {
        let file: SessionFile = load_json(&path).await?;
        Ok(Self {
            path: Some(path),
            offset,
            sessions: RwLock::new(file.sessions),
        })
    }

    /// Validate and record a session
    pub async fn log(&self, new: NewSession) -> Result<Session> {
        new.validate()?;

        let session = Session {
            id: Uuid::new_v4(),
            category: new.category.trim().to_lowercase(),
            duration_minutes: new.duration_minutes,
            note: new.note.filter(|n| !n.trim().is_empty()),
            at: new.at.unwrap_or_else(Utc::now),
        };

        let mut sessions = self.sessions.write().await;
        if let Some(path) = &self.path {
            let mut file = SessionFile {
                sessions: sessions.clone(),
            };
            file.sessions.push(session.clone());
            save_json(path, &file).await?;
        }
        sessions.push(session.clone());

        info!(category = %session.category, minutes = session.duration_minutes, "Logged session");
        Ok(session)
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.sessions.read().await.clone()
    }
}

#[async_trait]
impl Observer for SessionLog {
    fn manifest(&self) -> ObserverManifest {
        ObserverManifest::new("sessions", "Exercise sessions", env!("CARGO_PKG_VERSION"))
    }

    async fn on_entry_created(&self, entry: &Entry) -> Result<Option<Value>> {
        let day = local_date(entry.timestamp, self.offset);
        let same_day: Vec<Session> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|s| local_date(s.at, self.offset) == day)
            .cloned()
            .collect();

        if same_day.is_empty() {
            return Ok(None);
        }
        Ok(Some(json!({ "date": day, "sessions": same_day })))
    }

    async fn contribute_to_digest(
        &self,
        _entries: &[Entry],
        range: &DateRange,
    ) -> Result<Option<Value>> {
        let sessions = self.sessions.read().await;
        let mut by_category: BTreeMap<&str, (usize, f64)> = BTreeMap::new();

        for session in sessions
            .iter()
            .filter(|s| range_covers(range, local_date(s.at, self.offset), self.offset))
        {
            let slot = by_category.entry(session.category.as_str()).or_default();
            slot.0 += 1;
            slot.1 += session.duration_minutes;
        }

        if by_category.is_empty() {
            return Ok(None);
        }

        let total_minutes: f64 = by_category.values().map(|(_, m)| m).sum();
        let categories: Vec<Value> = by_category
            .into_iter()
            .map(|(category, (count, minutes))| {
                json!({ "category": category, "sessions": count, "minutes": minutes })
            })
            .collect();

        Ok(Some(json!({
            "categories": categories,
            "total_minutes": total_minutes,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reporting_offset;
    use crate::domain::NewEntry;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn session(category: &str, minutes: f64, at: DateTime<Utc>) -> NewSession {
        NewSession {
            category: category.to_string(),
            duration_minutes: minutes,
            note: None,
            at: Some(at),
        }
    }

    #[tokio::test]
    async fn test_log_rejects_invalid_input() {
        let log = SessionLog::in_memory(reporting_offset(0));

        let err = log.log(session("  ", 30.0, Utc::now())).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::Missing("category"))
        );

        let err = log.log(session("run", -5.0, Utc::now())).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::NotPositive { .. })
        ));

        assert!(log.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_attach_to_same_day_entries() {
        let log = SessionLog::in_memory(reporting_offset(0));
        let morning = Utc.with_ymd_and_hms(2024, 5, 2, 7, 0, 0).unwrap();
        log.log(session("Run", 30.0, morning)).await.unwrap();
        log.log(session("yoga", 20.0, morning - Duration::days(1))).await.unwrap();

        let entry = Entry::from_new(1, NewEntry::text("felt great").at(morning + Duration::hours(3)), morning);
        let value = log.on_entry_created(&entry).await.unwrap().unwrap();
        let sessions = value["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["category"], "run");
    }

    #[tokio::test]
    async fn test_digest_groups_by_category() {
        let log = SessionLog::in_memory(reporting_offset(0));
        let day = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        log.log(session("run", 30.0, day + Duration::hours(7))).await.unwrap();
        log.log(session("run", 15.0, day + Duration::hours(18))).await.unwrap();
        log.log(session("swim", 40.0, day + Duration::days(2))).await.unwrap();

        let range = DateRange::new(day, day + Duration::days(1));
        let value = log.contribute_to_digest(&[], &range).await.unwrap().unwrap();
        assert_eq!(value["total_minutes"], 45.0);
        assert_eq!(value["categories"][0]["sessions"], 2);
    }

    #[tokio::test]
    async fn test_failed_save_records_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sessions.json");
        let log = SessionLog::load(path.clone(), reporting_offset(0)).await.unwrap();

        // A directory where the file should be makes the write fail.
        std::fs::create_dir(&path).unwrap();
        assert!(log.log(session("run", 30.0, Utc::now())).await.is_err());
        assert!(log.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_persist() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sessions.json");

        let log = SessionLog::load(path.clone(), reporting_offset(0)).await.unwrap();
        log.log(session("walk", 25.0, Utc::now())).await.unwrap();

        let reopened = SessionLog::load(path, reporting_offset(0)).await.unwrap();
        assert_eq!(reopened.sessions().await.len(), 1);
    }
}
