//! Built-in observers.
//!
//! Each plugin keeps its own small JSON file in the home directory and
//! implements [`Observer`](crate::core::Observer) to attach its data to
//! entries and digests. Plugins are registered explicitly at startup.

pub mod activity;
pub mod sessions;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;

use crate::config::paths;
use crate::core::{HookDispatcher, RegistrationError};
use crate::domain::DateRange;

pub use activity::{ActivityTracker, DailyActivity};
pub use sessions::{NewSession, Session, SessionLog};

/// Rejected plugin input; nothing is recorded
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("'{0}' is required")]
    Missing(&'static str),

    #[error("'{field}' must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("'{field}' must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

/// Handles to the built-in plugins
#[derive(Clone)]
pub struct BuiltinPlugins {
    pub sessions: Arc<SessionLog>,
    pub activity: Arc<ActivityTracker>,
}

impl BuiltinPlugins {
    /// Load plugin data files from `home`
    pub async fn load(home: &Path, offset: FixedOffset) -> Result<Self> {
        Ok(Self {
            sessions: Arc::new(SessionLog::load(paths::sessions_in(home), offset).await?),
            activity: Arc::new(ActivityTracker::load(paths::activity_in(home), offset).await?),
        })
    }

    /// Register every built-in plugin, in a fixed order
    pub fn register(&self, dispatcher: &mut HookDispatcher) -> Result<(), RegistrationError> {
        dispatcher.register(self.sessions.clone())?;
        dispatcher.register(self.activity.clone())?;
        Ok(())
    }
}

/// Calendar date of an instant in the reporting offset
fn local_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// Whether a calendar date falls in a day-aligned range
fn range_covers(range: &DateRange, date: NaiveDate, offset: FixedOffset) -> bool {
    let first = local_date(range.from, offset);
    let end = local_date(range.to, offset);
    date >= first && date < end
}

async fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
