//! Enrichment pipeline.
//!
//! Drives each entry through transcribe → analyze → embed. Stages run
//! strictly in order within one run; runs for different entries overlap
//! freely. Every run, automatic or manual, holds the entry's run lock for
//! its whole duration, so two runs never interleave writes to one entry.
//!
//! Failures never retry inside the pipeline. The entry keeps its last good
//! fields; `processed` is set when the final stage of the run's chain has
//! been attempted, whether it succeeded or not.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{AudioSource, ProviderError, Providers};
use crate::domain::{Analysis, AnalysisResult, Entry, EntryId, EntryState, HookPoint, Stage};
use crate::ingest::AudioStore;

use super::hooks::{HookCall, HookDispatcher};
use super::store::{EntryStore, StoreError};

/// Errors surfaced by pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Entry not found: {0}")]
    NotFound(EntryId),

    #[error("{0} provider not configured")]
    NotConfigured(Stage),

    #[error("Entry {0} has no transcript")]
    MissingTranscript(EntryId),

    #[error("Entry {0} has no audio")]
    MissingAudio(EntryId),

    #[error("{stage} failed: {source}")]
    Provider {
        stage: Stage,
        #[source]
        source: ProviderError,
    },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl PipelineError {
    /// Whether the caller is at fault (as opposed to a provider or storage failure)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::NotFound(_)
                | PipelineError::NotConfigured(_)
                | PipelineError::MissingTranscript(_)
                | PipelineError::MissingAudio(_)
        )
    }

    fn from_provider(stage: Stage, err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured(stage) => PipelineError::NotConfigured(stage),
            source => PipelineError::Provider { stage, source },
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PipelineError::NotFound(id),
            other => PipelineError::Store(other),
        }
    }
}

/// Who started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Automatic,
    Manual,
}

/// Result of one stage's provider call, applied to the entry in one write
enum StageOutput {
    Transcript(String),
    Analysis(AnalysisResult),
    Embedding(Vec<f32>),
}

/// Per-entry run locks
#[derive(Default)]
struct EntryLocks {
    locks: Mutex<HashMap<EntryId, Arc<Mutex<()>>>>,
}

impl EntryLocks {
    async fn acquire(&self, id: EntryId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn forget(&self, id: EntryId) {
        self.locks.lock().await.remove(&id);
    }
}

/// The enrichment pipeline
pub struct EnrichmentPipeline {
    store: Arc<dyn EntryStore>,
    providers: Providers,
    hooks: Arc<HookDispatcher>,
    audio: AudioStore,
    locks: EntryLocks,

    /// Transient states for entries with a run in progress or a failed last run
    states: Mutex<HashMap<EntryId, EntryState>>,

    /// Entries with an automatic run scheduled or running
    in_flight: std::sync::Mutex<HashSet<EntryId>>,
}

/// Clears an entry's in-flight mark when the automatic run ends, even by panic
struct InFlight {
    pipeline: Arc<EnrichmentPipeline>,
    id: EntryId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.pipeline.in_flight().remove(&self.id);
    }
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<dyn EntryStore>,
        providers: Providers,
        hooks: Arc<HookDispatcher>,
        audio: AudioStore,
    ) -> Self {
        Self {
            store,
            providers,
            hooks,
            audio,
            locks: EntryLocks::default(),
            states: Mutex::new(HashMap::new()),
            in_flight: std::sync::Mutex::new(HashSet::new()),
        }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Current state of an entry: in-flight or failed state if one is
    /// recorded, otherwise the state implied by its fields
    pub async fn state(&self, id: EntryId) -> Result<EntryState, PipelineError> {
        if let Some(state) = self.states.lock().await.get(&id) {
            return Ok(*state);
        }
        let entry = self.load(id).await?;
        Ok(EntryState::of(&entry))
    }

    /// Schedule the automatic run for an entry as a background task.
    ///
    /// Returns `None` if an automatic run for this entry is already
    /// scheduled or running.
    pub async fn spawn_automatic(self: &Arc<Self>, id: EntryId) -> Option<JoinHandle<EntryState>> {
        if !self.in_flight().insert(id) {
            debug!(entry_id = id, "Automatic run already in flight");
            return None;
        }

        let guard = InFlight {
            pipeline: Arc::clone(self),
            id,
        };
        Some(tokio::spawn(async move {
            let state = guard.pipeline.run_automatic(id).await;
            drop(guard);
            state
        }))
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<EntryId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the automatic chain for an entry to completion.
    ///
    /// Never returns an error: failures are logged and reflected in the
    /// returned state and the entry's fields.
    #[instrument(skip(self), fields(entry_id = id))]
    pub async fn run_automatic(&self, id: EntryId) -> EntryState {
        let _guard = self.locks.acquire(id).await;

        let entry = match self.store.get(id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                warn!("Entry disappeared before enrichment");
                return EntryState::Captured;
            }
            Err(e) => {
                error!(error = %e, "Failed to load entry for enrichment");
                return EntryState::Captured;
            }
        };

        if entry.processed {
            debug!("Entry already processed, skipping automatic run");
            return EntryState::of(&entry);
        }

        let plan = self.automatic_plan(&entry);
        if plan.is_empty() {
            if entry.transcript.is_some() {
                return self.finish_without_stages(entry).await;
            }
            debug!("No audio or no transcriber configured, entry stays captured");
            return EntryState::Captured;
        }

        info!(stages = ?plan, "Starting automatic enrichment");
        match self.run_chain(entry, &plan, RunMode::Automatic).await {
            Ok(entry) => EntryState::of(&entry),
            Err((stage, e)) => {
                if e.is_client_error() {
                    warn!(%stage, error = %e, "Automatic enrichment stopped");
                } else {
                    error!(%stage, error = %e, "Automatic enrichment failed");
                }
                EntryState::Failed(stage)
            }
        }
    }

    /// Force re-transcription, then re-run analysis and embedding
    #[instrument(skip(self), fields(entry_id = id))]
    pub async fn retranscribe(&self, id: EntryId) -> Result<Entry, PipelineError> {
        self.require_configured(Stage::Transcribe)?;
        let _guard = self.locks.acquire(id).await;

        let entry = self.load(id).await?;
        if entry.audio_ref.is_none() {
            return Err(PipelineError::MissingAudio(id));
        }

        let plan = self.manual_plan(Stage::Transcribe);
        self.run_chain(entry, &plan, RunMode::Manual)
            .await
            .map_err(|(_, e)| e)
    }

    /// Force re-analysis, then re-embed
    #[instrument(skip(self), fields(entry_id = id))]
    pub async fn reanalyze(&self, id: EntryId) -> Result<Entry, PipelineError> {
        self.require_configured(Stage::Analyze)?;
        let _guard = self.locks.acquire(id).await;

        let entry = self.load(id).await?;
        if entry.transcript.is_none() {
            return Err(PipelineError::MissingTranscript(id));
        }

        let plan = self.manual_plan(Stage::Analyze);
        self.run_chain(entry, &plan, RunMode::Manual)
            .await
            .map_err(|(_, e)| e)
    }

    /// Compute a fresh embedding, replacing any existing one
    #[instrument(skip(self), fields(entry_id = id))]
    pub async fn reembed(&self, id: EntryId) -> Result<Entry, PipelineError> {
        self.require_configured(Stage::Embed)?;
        let _guard = self.locks.acquire(id).await;

        let entry = self.load(id).await?;
        if entry.transcript.is_none() {
            return Err(PipelineError::MissingTranscript(id));
        }

        self.run_chain(entry, &[Stage::Embed], RunMode::Manual)
            .await
            .map_err(|(_, e)| e)
    }

    /// Drop transient state for a deleted entry
    pub async fn forget(&self, id: EntryId) {
        self.states.lock().await.remove(&id);
        self.locks.forget(id).await;
    }

    /// Stages the automatic run should attempt, given populated fields
    fn automatic_plan(&self, entry: &Entry) -> Vec<Stage> {
        let mut plan = Vec::new();

        if entry.transcript.is_none() {
            if entry.audio_ref.is_none() || !self.providers.is_configured(Stage::Transcribe) {
                return plan;
            }
            plan.push(Stage::Transcribe);
        }
        if entry.analysis.is_none() && self.providers.is_configured(Stage::Analyze) {
            plan.push(Stage::Analyze);
        }
        if entry.embedding.is_none() && self.providers.is_configured(Stage::Embed) {
            plan.push(Stage::Embed);
        }

        plan
    }

    /// A manual request re-runs the requested stage and every configured stage after it
    fn manual_plan(&self, from: Stage) -> Vec<Stage> {
        [Stage::Transcribe, Stage::Analyze, Stage::Embed]
            .into_iter()
            .skip_while(|s| *s != from)
            .filter(|s| *s == from || self.providers.is_configured(*s))
            .collect()
    }

    fn require_configured(&self, stage: Stage) -> Result<(), PipelineError> {
        if self.providers.is_configured(stage) {
            Ok(())
        } else {
            Err(PipelineError::NotConfigured(stage))
        }
    }

    async fn load(&self, id: EntryId) -> Result<Entry, PipelineError> {
        self.store
            .get(id)
            .await?
            .ok_or(PipelineError::NotFound(id))
    }

    /// Mark an already-transcribed entry processed when no stage is configured
    async fn finish_without_stages(&self, entry: Entry) -> EntryState {
        let id = entry.id;
        match self.store.update(id, Box::new(|e| e.processed = true)).await {
            Ok(entry) => EntryState::of(&entry),
            Err(e) => {
                error!(error = %e, "Failed to mark entry processed");
                EntryState::of(&entry)
            }
        }
    }

    /// Execute `plan` in order against `entry`.
    ///
    /// On failure returns the failing stage and error; fields written by
    /// earlier stages are kept.
    async fn run_chain(
        &self,
        mut entry: Entry,
        plan: &[Stage],
        mode: RunMode,
    ) -> Result<Entry, (Stage, PipelineError)> {
        let id = entry.id;
        // A new run supersedes the outcome of the previous one.
        self.states.lock().await.remove(&id);

        for (index, &stage) in plan.iter().enumerate() {
            let is_last = index + 1 == plan.len();
            self.transition(id, EntryState::running(stage), mode).await;

            let started = Instant::now();
            let output = self.call_provider(stage, &entry).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let output = match output {
                Ok(output) => output,
                Err(e) => {
                    warn!(%stage, duration_ms, error = %e, "Stage failed");
                    self.transition(id, EntryState::Failed(stage), mode).await;
                    if is_last {
                        if let Err(store_err) =
                            self.store.update(id, Box::new(|e| e.processed = true)).await
                        {
                            error!(error = %store_err, "Failed to mark entry processed");
                        }
                    }
                    return Err((stage, e));
                }
            };

            entry = match self.apply(id, output, is_last).await {
                Ok(entry) => entry,
                Err(e) => {
                    self.transition(id, EntryState::Failed(stage), mode).await;
                    return Err((stage, e));
                }
            };
            info!(%stage, duration_ms, "Stage completed");
            self.transition(id, EntryState::completed(stage), mode).await;

            if stage == Stage::Analyze {
                entry = self.dispatch_analyzed(entry).await;
            }
        }

        self.states.lock().await.remove(&id);
        Ok(entry)
    }

    /// Call the provider for one stage
    async fn call_provider(&self, stage: Stage, entry: &Entry) -> Result<StageOutput, PipelineError> {
        let id = entry.id;

        match stage {
            Stage::Transcribe => {
                let transcriber = self
                    .providers
                    .transcriber
                    .as_ref()
                    .ok_or(PipelineError::NotConfigured(stage))?;
                let audio_ref = entry
                    .audio_ref
                    .as_ref()
                    .ok_or(PipelineError::MissingAudio(id))?;
                let path = self
                    .audio
                    .resolve(audio_ref)
                    .map_err(|e| PipelineError::from_provider(stage, ProviderError::failure(e)))?;

                let text = transcriber
                    .transcribe(&AudioSource { path })
                    .await
                    .map_err(|e| PipelineError::from_provider(stage, e))?;
                Ok(StageOutput::Transcript(text))
            }
            Stage::Analyze => {
                let analyzer = self
                    .providers
                    .analyzer
                    .as_ref()
                    .ok_or(PipelineError::NotConfigured(stage))?;
                let transcript = entry
                    .transcript
                    .as_deref()
                    .ok_or(PipelineError::MissingTranscript(id))?;

                let result = analyzer
                    .analyze(transcript, &entry.context)
                    .await
                    .map_err(|e| PipelineError::from_provider(stage, e))?;
                Ok(StageOutput::Analysis(result))
            }
            Stage::Embed => {
                let embedder = self
                    .providers
                    .embedder
                    .as_ref()
                    .ok_or(PipelineError::NotConfigured(stage))?;
                let text = entry
                    .embedding_text()
                    .ok_or(PipelineError::MissingTranscript(id))?;

                let vector = embedder
                    .embed(&text)
                    .await
                    .map_err(|e| PipelineError::from_provider(stage, e))?;

                let expected = embedder.dimensions();
                if expected > 0 && vector.len() != expected {
                    return Err(PipelineError::from_provider(
                        stage,
                        ProviderError::invalid(
                            "embedding",
                            format!("expected {} dimensions, got {}", expected, vector.len()),
                        ),
                    ));
                }
                Ok(StageOutput::Embedding(vector))
            }
        }
    }

    /// Write one stage's output (and optionally `processed`) in a single update
    async fn apply(
        &self,
        id: EntryId,
        output: StageOutput,
        mark_processed: bool,
    ) -> Result<Entry, PipelineError> {
        let now = Utc::now();

        let updated = self
            .store
            .update(
                id,
                Box::new(move |entry| {
                    match output {
                        StageOutput::Transcript(text) => {
                            entry.transcript = Some(text);
                            entry.transcribed_at = Some(now);
                        }
                        StageOutput::Analysis(result) => {
                            entry.analysis = Some(Analysis {
                                result,
                                analyzed_at: now,
                            });
                        }
                        StageOutput::Embedding(vector) => {
                            entry.embedding = Some(vector);
                            entry.embedded_at = Some(now);
                        }
                    }
                    if mark_processed {
                        entry.processed = true;
                    }
                }),
            )
            .await?;

        Ok(updated)
    }

    /// Run `entry_analyzed` observers and attach their results
    async fn dispatch_analyzed(&self, entry: Entry) -> Entry {
        if self.hooks.is_empty() {
            return entry;
        }

        let contributions = self.hooks.dispatch(HookCall::EntryAnalyzed(&entry)).await;
        let id = entry.id;
        match self
            .store
            .update(
                id,
                Box::new(move |e| e.attach_context(HookPoint::EntryAnalyzed, contributions)),
            )
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                warn!(error = %e, "Failed to attach observer context");
                entry
            }
        }
    }

    /// Record a state change, checking automatic transitions against the state machine
    async fn transition(&self, id: EntryId, next: EntryState, mode: RunMode) {
        let mut states = self.states.lock().await;

        if mode == RunMode::Automatic {
            let current = match states.get(&id) {
                Some(state) => Some(*state),
                None => self.store.get(id).await.ok().flatten().map(|e| EntryState::of(&e)),
            };
            if let Some(current) = current {
                if !current.can_transition_to(next) {
                    warn!(entry_id = id, %current, %next, "Unexpected pipeline transition");
                }
            }
        }

        debug!(entry_id = id, state = %next, "Pipeline transition");
        states.insert(id, next);
    }
}
