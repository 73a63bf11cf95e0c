//! Pattern and digest analytics.
//!
//! Both reports are pure functions of a time-bounded slice of the entry
//! store. Calendar days, hours and weekdays are taken in a fixed reporting
//! offset from UTC (`analytics.utc_offset_minutes`).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Timelike, Utc,
    Weekday,
};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::adapters::NarrativeGenerator;
use crate::domain::{
    ActiveHour, DailySentiment, DateRange, Digest, DigestPeriod, Entry, Highlight, LabelCount,
    PatternOutcome, PatternReport,
};

use super::hooks::{HookCall, HookDispatcher};
use super::store::{EntryStore, StoreError};

const TOP_TOPICS: usize = 10;
const TOP_HOURS: usize = 5;

/// Longest pattern window, in days
pub const MAX_PATTERN_DAYS: i64 = 36_500;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// Counts labels, remembering first-seen order for tie-breaking
#[derive(Default)]
struct Tally {
    counts: Vec<LabelCount>,
    index: HashMap<String, usize>,
}

impl Tally {
    fn add(&mut self, label: &str) {
        match self.index.get(label) {
            Some(&i) => self.counts[i].count += 1,
            None => {
                self.index.insert(label.to_string(), self.counts.len());
                self.counts.push(LabelCount {
                    label: label.to_string(),
                    count: 1,
                });
            }
        }
    }

    /// Descending by count; equal counts keep first-seen order
    fn ranked(mut self, limit: Option<usize>) -> Vec<LabelCount> {
        self.counts.sort_by(|a, b| b.count.cmp(&a.count));
        if let Some(limit) = limit {
            self.counts.truncate(limit);
        }
        self.counts
    }

    fn top(&self) -> Option<&str> {
        self.counts
            .iter()
            .fold(None::<&LabelCount>, |best, c| match best {
                Some(b) if b.count >= c.count => Some(b),
                _ => Some(c),
            })
            .map(|c| c.label.as_str())
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Offset for a configured number of minutes east of UTC
pub fn reporting_offset(utc_offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

/// UTC instant of local midnight on `date`
fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    (local - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

/// Calendar-aligned window containing `date`: the day itself, or the
/// Sunday–Saturday week
pub fn digest_window(period: DigestPeriod, date: NaiveDate, offset: FixedOffset) -> DateRange {
    let (start, days) = match period {
        DigestPeriod::Daily => (date, 1),
        DigestPeriod::Weekly => {
            let back = i64::from(date.weekday().num_days_from_sunday());
            (date - Duration::days(back), 7)
        }
    };
    let from = local_midnight(start, offset);
    DateRange::new(from, from + Duration::days(days))
}

/// Aggregate a window of entries into a pattern report.
///
/// An empty slice yields [`PatternOutcome::NoEntries`].
pub fn pattern_report(entries: &[Entry], range: DateRange, offset: FixedOffset) -> PatternOutcome {
    if entries.is_empty() {
        return PatternOutcome::NoEntries { range };
    }

    let mut topics = Tally::default();
    let mut moods = Tally::default();
    let mut daily: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    let mut hours: BTreeMap<u32, (usize, Tally)> = BTreeMap::new();
    let mut weekdays = [0usize; 7];
    let mut scores = Vec::new();

    for entry in entries {
        let local = entry.timestamp.with_timezone(&offset);

        let (count, hour_moods) = hours.entry(local.hour()).or_default();
        *count += 1;
        weekdays[local.weekday().num_days_from_sunday() as usize] += 1;

        for topic in entry.topics() {
            topics.add(topic);
        }
        if let Some(mood) = entry.mood() {
            moods.add(mood);
            hour_moods.add(mood);
        }
        if let Some(score) = entry.sentiment_score() {
            scores.push(score);
            let day = daily.entry(local.date_naive()).or_insert((0.0, 0));
            day.0 += score;
            day.1 += 1;
        }
    }

    let sentiment_trend = daily
        .into_iter()
        .map(|(date, (sum, n))| DailySentiment {
            date,
            avg_sentiment: sum / n as f64,
            entries: n,
        })
        .collect();

    let mut active_hours: Vec<ActiveHour> = hours
        .into_iter()
        .map(|(hour, (count, moods))| ActiveHour {
            hour,
            count,
            dominant_mood: moods.top().map(str::to_string),
        })
        .collect();
    active_hours.sort_by(|a, b| b.count.cmp(&a.count).then(a.hour.cmp(&b.hour)));
    active_hours.truncate(TOP_HOURS);

    let day_of_week = WEEKDAYS
        .iter()
        .zip(weekdays)
        .map(|(day, count)| LabelCount {
            label: day.to_string(),
            count,
        })
        .collect();

    PatternOutcome::Report(PatternReport {
        range,
        total_entries: entries.len(),
        analyzed_entries: scores.len(),
        avg_sentiment: mean(scores.into_iter()),
        top_topics: topics.ranked(Some(TOP_TOPICS)),
        mood_distribution: moods.ranked(None),
        sentiment_trend,
        active_hours,
        day_of_week,
    })
}

/// Aggregate fields of a digest, without observer context or narrative
pub fn digest_aggregate(period: DigestPeriod, range: DateRange, entries: &[Entry]) -> Digest {
    let mut sentiments = Tally::default();
    let mut topics = Tally::default();
    let mut moods = Tally::default();
    let mut action_items: Vec<String> = Vec::new();
    let mut highlights = Vec::new();

    for entry in entries {
        if let Some(sentiment) = entry.sentiment() {
            sentiments.add(sentiment.as_str());
        }
        for topic in entry.topics() {
            topics.add(topic);
        }
        if let Some(mood) = entry.mood() {
            moods.add(mood);
        }
        for item in entry.action_items() {
            if !action_items.contains(item) {
                action_items.push(item.clone());
            }
        }
        if let Some(summary) = entry.summary() {
            highlights.push(Highlight {
                entry_id: entry.id,
                timestamp: entry.timestamp,
                summary: summary.to_string(),
            });
        }
    }

    Digest {
        period,
        range,
        entry_count: entries.len(),
        avg_sentiment: mean(entries.iter().filter_map(Entry::sentiment_score)),
        sentiment_breakdown: sentiments.ranked(None),
        top_topics: topics.ranked(Some(TOP_TOPICS)),
        moods: moods.ranked(None),
        action_items,
        highlights,
        contributions: Vec::new(),
        narrative: None,
    }
}

/// Payload handed to the narrative provider: the aggregate plus raw entry text
fn narrative_payload(digest: &Digest, entries: &[Entry]) -> Value {
    let notes: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "timestamp": e.timestamp,
                "context": e.context,
                "summary": e.summary(),
                "transcript": e.transcript,
            })
        })
        .collect();

    json!({
        "period": digest.period,
        "range": digest.range,
        "entry_count": digest.entry_count,
        "avg_sentiment": digest.avg_sentiment,
        "sentiment_breakdown": digest.sentiment_breakdown,
        "top_topics": digest.top_topics,
        "moods": digest.moods,
        "action_items": digest.action_items,
        "contributions": digest.contributions,
        "entries": notes,
    })
}

/// Pattern and digest queries over the entry store
pub struct Analytics {
    store: Arc<dyn EntryStore>,
    hooks: Arc<HookDispatcher>,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
    offset: FixedOffset,
}

impl Analytics {
    pub fn new(
        store: Arc<dyn EntryStore>,
        hooks: Arc<HookDispatcher>,
        narrator: Option<Arc<dyn NarrativeGenerator>>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            hooks,
            narrator,
            offset,
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Pattern report over the trailing `days` days
    pub async fn patterns(&self, days: i64) -> Result<PatternOutcome, StoreError> {
        self.patterns_at(days, Utc::now()).await
    }

    /// Pattern report over `[now - days, now]`; `days` is clamped to
    /// `1..=MAX_PATTERN_DAYS`
    #[instrument(skip(self))]
    pub async fn patterns_at(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<PatternOutcome, StoreError> {
        let from = now - Duration::days(days.clamp(1, MAX_PATTERN_DAYS));
        // Inclusive of entries stamped exactly `now`.
        let range = DateRange::new(from, now + Duration::milliseconds(1));

        let entries = self.store.list_between(range.from, range.to).await?;
        debug!(entries = entries.len(), "Computing pattern report");
        Ok(pattern_report(&entries, range, self.offset))
    }

    /// Today's date in the reporting offset
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }

    /// Digest for the calendar window containing `date` (default today).
    ///
    /// With `with_narrative`, the narrative provider is asked for prose; a
    /// missing or failing provider leaves `narrative` empty.
    #[instrument(skip(self))]
    pub async fn digest(
        &self,
        period: DigestPeriod,
        date: Option<NaiveDate>,
        with_narrative: bool,
    ) -> Result<Digest, StoreError> {
        let date = date.unwrap_or_else(|| self.today());
        let range = digest_window(period, date, self.offset);

        let entries = self.store.list_between(range.from, range.to).await?;
        let mut digest = digest_aggregate(period, range, &entries);

        if !self.hooks.is_empty() {
            digest.contributions = self
                .hooks
                .dispatch(HookCall::Digest {
                    entries: &entries,
                    range: &range,
                })
                .await;
        }

        if with_narrative && !entries.is_empty() {
            match &self.narrator {
                Some(narrator) => {
                    let payload = narrative_payload(&digest, &entries);
                    match narrator.generate_narrative(&payload).await {
                        Ok(narrative) => digest.narrative = Some(narrative),
                        Err(e) => {
                            warn!(error = %e, "Narrative generation failed, returning aggregate only")
                        }
                    }
                }
                None => debug!("Narrative requested but no provider configured"),
            }
        }

        info!(
            period = ?period,
            entries = digest.entry_count,
            narrative = digest.narrative.is_some(),
            "Digest generated"
        );
        Ok(digest)
    }
}
