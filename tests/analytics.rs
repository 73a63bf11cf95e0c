//! Pattern and Digest Integration Tests

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use common::{analysis, journal, StubAnalyzer, StubNarrator};
use murmur::adapters::{Analyzer, ProviderError, Providers};
use murmur::core::analytics::MAX_PATTERN_DAYS;
use murmur::domain::{AnalysisResult, DigestPeriod, NewEntry, PatternOutcome, Sentiment};
use murmur::Journal;

/// Reads the sentiment score from the leading number, e.g. "0.6 quiet evening"
struct ScoredAnalyzer;

#[async_trait]
impl Analyzer for ScoredAnalyzer {
    fn name(&self) -> &str {
        "scored"
    }

    async fn analyze(&self, transcript: &str, _context: &str) -> Result<AnalysisResult, ProviderError> {
        let (score, rest) = transcript.split_once(' ').unwrap_or((transcript, ""));
        let score: f64 = score
            .parse()
            .map_err(|_| ProviderError::invalid("analysis", "missing score prefix"))?;
        let sentiment = if score >= 0.6 {
            Sentiment::Positive
        } else {
            Sentiment::Neutral
        };
        let topics: Vec<&str> = rest.split_whitespace().take(1).collect();
        Ok(analysis(rest, sentiment, score, &topics, "calm"))
    }
}

fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

async fn add(journal: &Journal, text: &str, at: DateTime<Utc>) {
    let (_, task) = journal.ingest(NewEntry::text(text).at(at)).await.unwrap();
    task.unwrap().await.unwrap();
}

#[tokio::test]
async fn test_single_work_note_pattern() {
    let analyzer = StubAnalyzer::new(analysis(
        "Positive meeting about the budget",
        Sentiment::Positive,
        0.8,
        &["work", "budget"],
        "optimistic",
    ));
    let t = journal(Providers::default().with_analyzer(Arc::new(analyzer))).await;

    let at = noon(2024, 5, 2);
    add(&t.journal, "Meeting went well, Sarah mentioned the budget", at).await;

    let outcome = t
        .journal
        .analytics()
        .patterns_at(1, at + Duration::hours(1))
        .await
        .unwrap();
    let report = outcome.report().expect("window has one entry");

    assert_eq!(report.total_entries, 1);
    assert_eq!(report.analyzed_entries, 1);
    assert!((report.avg_sentiment.unwrap() - 0.8).abs() < 1e-9);

    let topics: Vec<(&str, usize)> = report
        .top_topics
        .iter()
        .map(|t| (t.label.as_str(), t.count))
        .collect();
    assert_eq!(topics, vec![("work", 1), ("budget", 1)]);
    assert_eq!(report.mood_distribution[0].label, "optimistic");
}

#[tokio::test]
async fn test_average_sentiment_over_window() {
    let t = journal(Providers::default().with_analyzer(Arc::new(ScoredAnalyzer))).await;
    let at = noon(2024, 5, 2);

    add(&t.journal, "0.6 errands", at - Duration::hours(3)).await;
    add(&t.journal, "1.0 promotion", at).await;
    // Outside a one-day window.
    add(&t.journal, "0.0 flu", at - Duration::days(3)).await;

    let outcome = t.journal.analytics().patterns_at(1, at).await.unwrap();
    let report = outcome.report().unwrap();

    assert_eq!(report.total_entries, 2);
    assert!((report.avg_sentiment.unwrap() - 0.8).abs() < 1e-9);
    assert_eq!(report.sentiment_trend.len(), 1);
}

#[tokio::test]
async fn test_empty_window_reports_no_entries() {
    let t = journal(Providers::default()).await;
    add(&t.journal, "old note", noon(2024, 1, 1)).await;

    let outcome = t
        .journal
        .analytics()
        .patterns_at(7, noon(2024, 5, 2))
        .await
        .unwrap();
    assert!(matches!(outcome, PatternOutcome::NoEntries { .. }));
    assert!(outcome.report().is_none());
}

#[tokio::test]
async fn test_oversized_window_is_clamped() {
    let t = journal(Providers::default()).await;
    let at = noon(2024, 5, 2);
    add(&t.journal, "decades ago", at - Duration::days(365 * 50)).await;
    add(&t.journal, "today", at).await;

    for days in [i64::MAX, MAX_PATTERN_DAYS + 1, MAX_PATTERN_DAYS] {
        let outcome = t.journal.analytics().patterns_at(days, at).await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.total_entries, 2);
        assert_eq!(report.range.from, at - Duration::days(MAX_PATTERN_DAYS));
    }

    // Non-positive windows cover one day.
    let outcome = t.journal.analytics().patterns_at(i64::MIN, at).await.unwrap();
    assert_eq!(outcome.report().unwrap().total_entries, 1);
}

#[tokio::test]
async fn test_unanalyzed_entries_count_but_carry_no_sentiment() {
    let t = journal(Providers::default()).await;
    let at = noon(2024, 5, 2);
    add(&t.journal, "plain text", at).await;

    let outcome = t.journal.analytics().patterns_at(1, at).await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.total_entries, 1);
    assert_eq!(report.analyzed_entries, 0);
    assert!(report.avg_sentiment.is_none());
    assert!(report.top_topics.is_empty());
}

#[tokio::test]
async fn test_narrative_failure_keeps_aggregate() {
    let narrator = StubNarrator::new(true);
    let providers = Providers::default()
        .with_analyzer(Arc::new(ScoredAnalyzer))
        .with_narrator(narrator.clone());
    let t = journal(providers).await;

    let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
    add(&t.journal, "0.6 errands", noon(2024, 5, 2)).await;
    add(&t.journal, "1.0 promotion", noon(2024, 5, 2) + Duration::hours(2)).await;

    let digest = t
        .journal
        .digest(DigestPeriod::Daily, Some(day), true)
        .await
        .unwrap();

    assert_eq!(narrator.calls.load(Ordering::SeqCst), 1);
    assert!(digest.narrative.is_none());
    assert_eq!(digest.entry_count, 2);
    assert!((digest.avg_sentiment.unwrap() - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_narrative_attached_when_requested() {
    let narrator = StubNarrator::new(false);
    let t = journal(Providers::default().with_narrator(narrator.clone())).await;

    let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
    add(&t.journal, "walked to the lake", noon(2024, 5, 2)).await;

    let without = t
        .journal
        .digest(DigestPeriod::Daily, Some(day), false)
        .await
        .unwrap();
    assert!(without.narrative.is_none());
    assert_eq!(narrator.calls.load(Ordering::SeqCst), 0);

    let with = t
        .journal
        .digest(DigestPeriod::Daily, Some(day), true)
        .await
        .unwrap();
    assert_eq!(with.narrative.unwrap().headline, "1 notes");
}

#[tokio::test]
async fn test_empty_digest_skips_narrative() {
    let narrator = StubNarrator::new(false);
    let t = journal(Providers::default().with_narrator(narrator.clone())).await;

    let digest = t
        .journal
        .digest(
            DigestPeriod::Weekly,
            Some(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()),
            true,
        )
        .await
        .unwrap();

    assert_eq!(digest.entry_count, 0);
    assert!(digest.narrative.is_none());
    assert_eq!(narrator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_weekly_digest_spans_sunday_to_saturday() {
    let t = journal(Providers::default()).await;

    // 2024-05-05 is a Sunday, 2024-05-11 a Saturday.
    add(&t.journal, "sunday", noon(2024, 5, 5)).await;
    add(&t.journal, "saturday", noon(2024, 5, 11)).await;
    add(&t.journal, "next sunday", noon(2024, 5, 12)).await;
    add(&t.journal, "previous saturday", noon(2024, 5, 4)).await;

    let digest = t
        .journal
        .digest(
            DigestPeriod::Weekly,
            Some(NaiveDate::from_ymd_opt(2024, 5, 8).unwrap()),
            false,
        )
        .await
        .unwrap();

    assert_eq!(digest.entry_count, 2);
    assert_eq!(digest.range.from, Utc.with_ymd_and_hms(2024, 5, 5, 0, 0, 0).unwrap());
    assert_eq!(digest.range.to, Utc.with_ymd_and_hms(2024, 5, 12, 0, 0, 0).unwrap());
}
