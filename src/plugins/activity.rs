//! Daily activity metrics (steps, active minutes).

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::info;

use crate::core::{Observer, ObserverManifest};
use crate::domain::{DateRange, Entry};

use super::{load_json, local_date, range_covers, save_json, ValidationError};

const MINUTES_PER_DAY: u64 = 24 * 60;

/// Metrics recorded for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub steps: u64,
    #[serde(default)]
    pub active_minutes: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ActivityFile {
    #[serde(default)]
    days: Vec<DailyActivity>,
}

pub struct ActivityTracker {
    path: Option<PathBuf>,
    offset: FixedOffset,
    days: RwLock<BTreeMap<NaiveDate, DailyActivity>>,
}

impl ActivityTracker {
    pub fn in_memory(offset: FixedOffset) -> Self {
        Self {
            path: None,
            offset,
            days: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn load(path: PathBuf, offset: FixedOffset) -> Result<Self> {
        let file: ActivityFile = load_json(&path).await?;
        let days = file.days.into_iter().map(|d| (d.date, d)).collect();
        Ok(Self {
            path: Some(path),
            offset,
            days: RwLock::new(days),
        })
    }

    /// Record (or replace) a day's metrics
    pub async fn record(&self, day: DailyActivity) -> Result<DailyActivity> {
        if u64::from(day.active_minutes) > MINUTES_PER_DAY {
            return Err(ValidationError::TooLarge {
                field: "active_minutes",
                value: u64::from(day.active_minutes),
                max: MINUTES_PER_DAY,
            }
            .into());
        }

        let mut days = self.days.write().await;
        if let Some(path) = &self.path {
            let mut next = days.clone();
            next.insert(day.date, day.clone());
            let file = ActivityFile {
                days: next.into_values().collect(),
            };
            save_json(path, &file).await?;
        }
        days.insert(day.date, day.clone());

        info!(date = %day.date, steps = day.steps, "Recorded activity");
        Ok(day)
    }

    pub async fn day(&self, date: NaiveDate) -> Option<DailyActivity> {
        self.days.read().await.get(&date).cloned()
    }
}

#[async_trait]
impl Observer for ActivityTracker {
    fn manifest(&self) -> ObserverManifest {
        ObserverManifest::new("activity", "Daily activity", env!("CARGO_PKG_VERSION"))
    }

    async fn on_entry_analyzed(&self, entry: &Entry) -> Result<Option<Value>> {
        let date = local_date(entry.timestamp, self.offset);
        Ok(self.day(date).await.map(|d| json!(d)))
    }

    async fn contribute_to_digest(
        &self,
        _entries: &[Entry],
        range: &DateRange,
    ) -> Result<Option<Value>> {
        let days = self.days.read().await;
        let covered: Vec<&DailyActivity> = days
            .values()
            .filter(|d| range_covers(range, d.date, self.offset))
            .collect();

        if covered.is_empty() {
            return Ok(None);
        }

        let total_steps: u64 = covered.iter().map(|d| d.steps).sum();
        let active_minutes: u64 = covered.iter().map(|d| u64::from(d.active_minutes)).sum();

        Ok(Some(json!({
            "days_recorded": covered.len(),
            "total_steps": total_steps,
            "active_minutes": active_minutes,
            "avg_steps": total_steps as f64 / covered.len() as f64,
        })))
    }
}
