//! Enrichment Pipeline Integration Tests
//!
//! Drives entries through the pipeline with deterministic stub providers.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{analysis, journal, KeywordEmbedder, StubAnalyzer, StubTranscriber};
use murmur::adapters::Providers;
use murmur::core::{EntryStore, HookDispatcher, Journal, SnapshotStore};
use murmur::domain::{EntryState, NewEntry, Sentiment, Stage};
use murmur::ingest::AudioStore;
use murmur::PipelineError;

fn work_analysis() -> StubAnalyzer {
    StubAnalyzer::new(analysis(
        "Budget meeting went well",
        Sentiment::Positive,
        0.8,
        &["work", "budget"],
        "optimistic",
    ))
}

fn embedder() -> Arc<KeywordEmbedder> {
    Arc::new(KeywordEmbedder::new(vec![], vec![0.0, 1.0, 0.0]))
}

#[tokio::test]
async fn test_text_entry_runs_analysis_then_embedding() {
    let t = journal(
        Providers::default()
            .with_analyzer(Arc::new(work_analysis()))
            .with_embedder(embedder()),
    )
    .await;

    let (id, task) = t
        .journal
        .ingest(NewEntry::text("Meeting went well, Sarah mentioned the budget").with_context("work"))
        .await
        .unwrap();
    assert_eq!(task.unwrap().await.unwrap(), EntryState::Embedded);

    let entry = t.journal.get(id).await.unwrap();
    assert_eq!(entry.context, "work");
    assert_eq!(entry.summary(), Some("Budget meeting went well"));
    assert_eq!(entry.sentiment(), Some(Sentiment::Positive));
    assert_eq!(entry.embedding.as_ref().map(Vec::len), Some(3));
    assert!(entry.embedded_at.is_some());
    assert!(entry.processed);
}

#[tokio::test]
async fn test_no_automatic_transcription_without_audio() {
    let transcriber = StubTranscriber::new("should never appear");
    let t = journal(Providers::default().with_transcriber(transcriber.clone())).await;

    let (empty_id, task) = t.journal.ingest(NewEntry::default()).await.unwrap();
    assert_eq!(task.unwrap().await.unwrap(), EntryState::Captured);

    let (text_id, task) = t.journal.ingest(NewEntry::text("typed note")).await.unwrap();
    task.unwrap().await.unwrap();

    assert_eq!(transcriber.calls(), 0);
    let empty = t.journal.get(empty_id).await.unwrap();
    assert!(empty.transcript.is_none());
    assert!(!empty.processed);
    assert_eq!(t.journal.state(empty_id).await.unwrap(), EntryState::Captured);

    // Nothing left to run, so the typed note is done.
    assert!(t.journal.get(text_id).await.unwrap().processed);
}

#[tokio::test]
async fn test_audio_entry_is_transcribed_first() {
    let transcriber = StubTranscriber::new("Remember to call the dentist");
    let analyzer = Arc::new(work_analysis());
    let t = journal(
        Providers::default()
            .with_transcriber(transcriber.clone())
            .with_analyzer(analyzer.clone()),
    )
    .await;

    let source = t.temp.path().join("memo.m4a");
    tokio::fs::write(&source, b"not really audio").await.unwrap();

    let (id, task) = t
        .journal
        .ingest_audio(&source, NewEntry::default().with_device("phone"))
        .await
        .unwrap();
    assert_eq!(task.unwrap().await.unwrap(), EntryState::Analyzed);

    let entry = t.journal.get(id).await.unwrap();
    assert_eq!(entry.transcript.as_deref(), Some("Remember to call the dentist"));
    assert!(entry.transcribed_at.is_some());
    assert!(entry.audio_ref.is_some());
    assert!(entry.processed);
    assert_eq!(transcriber.calls(), 1);
    assert_eq!(analyzer.calls(), 1);
}

#[tokio::test]
async fn test_analysis_failure_leaves_fields_unset() {
    let t = journal(
        Providers::default()
            .with_analyzer(Arc::new(StubAnalyzer::failing()))
            .with_embedder(embedder()),
    )
    .await;

    let (id, task) = t.journal.ingest(NewEntry::text("hard to read")).await.unwrap();
    assert_eq!(task.unwrap().await.unwrap(), EntryState::Failed(Stage::Analyze));

    let entry = t.journal.get(id).await.unwrap();
    assert!(entry.summary().is_none());
    assert!(entry.sentiment().is_none());
    assert!(entry.mood().is_none());
    assert!(entry.embedding.is_none());
    // Embedding was never attempted, so the entry is still pending.
    assert!(!entry.processed);
    assert_eq!(
        t.journal.state(id).await.unwrap(),
        EntryState::Failed(Stage::Analyze)
    );
}

#[tokio::test]
async fn test_failure_at_last_stage_marks_processed() {
    let t = journal(Providers::default().with_analyzer(Arc::new(StubAnalyzer::failing()))).await;

    let (id, task) = t.journal.ingest(NewEntry::text("hmm")).await.unwrap();
    task.unwrap().await.unwrap();

    let entry = t.journal.get(id).await.unwrap();
    assert!(entry.analysis.is_none());
    assert!(entry.processed);
}

#[tokio::test]
async fn test_reanalyze_is_idempotent() {
    let analyzer = Arc::new(work_analysis());
    let t = journal(Providers::default().with_analyzer(analyzer.clone())).await;

    let (id, task) = t.journal.ingest(NewEntry::text("same words")).await.unwrap();
    task.unwrap().await.unwrap();

    let first = t.journal.reanalyze(id).await.unwrap();
    let second = t.journal.reanalyze(id).await.unwrap();

    assert_eq!(first.summary(), second.summary());
    assert_eq!(first.sentiment(), second.sentiment());
    assert_eq!(first.mood(), second.mood());
    assert_eq!(first.topics(), second.topics());
    assert_eq!(analyzer.calls(), 3);
}

#[tokio::test]
async fn test_manual_request_errors() {
    let t = journal(
        Providers::default()
            .with_analyzer(Arc::new(work_analysis()))
            .with_embedder(embedder()),
    )
    .await;

    assert!(matches!(
        t.journal.reanalyze(12345).await,
        Err(PipelineError::NotFound(12345))
    ));
    assert!(matches!(
        t.journal.retranscribe(12345).await,
        Err(PipelineError::NotConfigured(Stage::Transcribe))
    ));

    let (id, task) = t.journal.ingest(NewEntry::default()).await.unwrap();
    task.unwrap().await.unwrap();
    let err = t.journal.reembed(id).await.unwrap_err();
    assert!(matches!(err, PipelineError::MissingTranscript(_)));
    assert!(err.is_client_error());
}

#[tokio::test]
async fn test_reanalyze_also_refreshes_embedding() {
    let t = journal(
        Providers::default()
            .with_analyzer(Arc::new(work_analysis()))
            .with_embedder(embedder()),
    )
    .await;

    let (id, task) = t.journal.ingest(NewEntry::text("note")).await.unwrap();
    task.unwrap().await.unwrap();
    let before = t.journal.get(id).await.unwrap().embedded_at;

    tokio::time::sleep(Duration::from_millis(5)).await;
    let after = t.journal.reanalyze(id).await.unwrap();
    assert!(after.embedded_at > before);
}

#[tokio::test]
async fn test_runs_for_same_entry_are_serialized() {
    let analyzer = Arc::new(work_analysis().slow(Duration::from_millis(50)));
    let t = journal(Providers::default().with_analyzer(analyzer.clone())).await;

    let (id, task) = t.journal.ingest(NewEntry::text("one")).await.unwrap();
    task.unwrap().await.unwrap();
    analyzer.max_active.store(0, Ordering::SeqCst);

    let (a, b) = tokio::join!(t.journal.reanalyze(id), t.journal.reanalyze(id));
    a.unwrap();
    b.unwrap();
    assert_eq!(analyzer.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_runs_for_different_entries_overlap() {
    let analyzer = Arc::new(work_analysis().slow(Duration::from_millis(50)));
    let t = journal(Providers::default().with_analyzer(analyzer.clone())).await;

    let (first, task) = t.journal.ingest(NewEntry::text("one")).await.unwrap();
    task.unwrap().await.unwrap();
    let (second, task) = t.journal.ingest(NewEntry::text("two")).await.unwrap();
    task.unwrap().await.unwrap();
    analyzer.max_active.store(0, Ordering::SeqCst);

    let (a, b) = tokio::join!(t.journal.reanalyze(first), t.journal.reanalyze(second));
    a.unwrap();
    b.unwrap();
    assert_eq!(analyzer.max_active.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_enrich_pending_picks_up_unprocessed_entries() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("entries.json");

    // Captured while no analyzer was configured.
    let store = SnapshotStore::open(path.clone()).await.unwrap();
    let pending = store.create(NewEntry::text("left over")).await.unwrap();
    drop(store);

    let store = Arc::new(SnapshotStore::open(path.clone()).await.unwrap());
    let journal = Journal::new(
        store,
        Providers::default().with_analyzer(Arc::new(work_analysis())),
        HookDispatcher::new(),
        AudioStore::new(temp.path().join("audio")),
        murmur::core::reporting_offset(0),
    );

    let tasks = journal.enrich_pending().await.unwrap();
    assert_eq!(tasks.len(), 1);
    for task in tasks {
        assert_eq!(task.await.unwrap(), EntryState::Analyzed);
    }

    // Persisted to the snapshot, not just held in memory.
    let reopened = SnapshotStore::open(path).await.unwrap();
    let entry = reopened.get(pending.id).await.unwrap().unwrap();
    assert!(entry.summary().is_some());
    assert!(entry.processed);
}

#[tokio::test]
async fn test_delete_removes_audio() {
    let t = journal(Providers::default()).await;
    let source = t.temp.path().join("memo.wav");
    tokio::fs::write(&source, b"riff").await.unwrap();

    let (id, _) = t
        .journal
        .ingest_audio(&source, NewEntry::default())
        .await
        .unwrap();
    let entry = t.journal.get(id).await.unwrap();
    let audio_ref = entry.audio_ref.unwrap();
    let stored = t.temp.path().join("audio").join(audio_ref.as_str());
    assert!(stored.exists());

    t.journal.delete(id).await.unwrap();
    assert!(!stored.exists());
    assert!(matches!(
        t.journal.get(id).await,
        Err(PipelineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_keeps_audio_shared_with_another_entry() {
    let t = journal(Providers::default()).await;
    let first = t.temp.path().join("memo.wav");
    let second = t.temp.path().join("memo-copy.wav");
    tokio::fs::write(&first, b"same bytes").await.unwrap();
    tokio::fs::write(&second, b"same bytes").await.unwrap();

    let (a, _) = t.journal.ingest_audio(&first, NewEntry::default()).await.unwrap();
    let (b, _) = t.journal.ingest_audio(&second, NewEntry::default()).await.unwrap();

    let audio_a = t.journal.get(a).await.unwrap().audio_ref.unwrap();
    let audio_b = t.journal.get(b).await.unwrap().audio_ref.unwrap();
    assert_eq!(audio_a, audio_b);
    let stored = t.temp.path().join("audio").join(audio_b.as_str());

    t.journal.delete(a).await.unwrap();
    assert!(stored.exists());

    t.journal.delete(b).await.unwrap();
    assert!(!stored.exists());
}
