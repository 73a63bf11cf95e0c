//! Journal facade.
//!
//! Owns the entry store and wires the pipeline, dispatcher, search engine
//! and analytics together. Ingestion returns as soon as the entry exists;
//! enrichment continues on a background task.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveDate};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::adapters::Providers;
use crate::config::{paths, ResolvedConfig};
use crate::domain::{
    Digest, DigestPeriod, Entry, EntryId, EntryState, EntryView, HookPoint, NewEntry,
    PatternOutcome,
};
use crate::ingest::AudioStore;

use super::analytics::{reporting_offset, Analytics};
use super::hooks::{HookCall, HookDispatcher};
use super::pipeline::{EnrichmentPipeline, PipelineError};
use super::search::{SearchEngine, SearchHit, SearchOptions};
use super::store::{EntryStore, SnapshotStore};

/// Background enrichment started by ingestion
pub type EnrichmentTask = JoinHandle<EntryState>;

pub struct Journal {
    store: Arc<dyn EntryStore>,
    pipeline: Arc<EnrichmentPipeline>,
    hooks: Arc<HookDispatcher>,
    search: SearchEngine,
    analytics: Analytics,
    audio: AudioStore,
}

impl Journal {
    pub fn new(
        store: Arc<dyn EntryStore>,
        providers: Providers,
        hooks: HookDispatcher,
        audio: AudioStore,
        offset: FixedOffset,
    ) -> Self {
        let hooks = Arc::new(hooks);
        let search = SearchEngine::new(Arc::clone(&store), providers.embedder.clone());
        let analytics = Analytics::new(
            Arc::clone(&store),
            Arc::clone(&hooks),
            providers.narrator.clone(),
            offset,
        );
        let pipeline = Arc::new(EnrichmentPipeline::new(
            Arc::clone(&store),
            providers,
            Arc::clone(&hooks),
            audio.clone(),
        ));

        Self {
            store,
            pipeline,
            hooks,
            search,
            analytics,
            audio,
        }
    }

    /// Open the journal in the configured home directory
    pub async fn open(config: &ResolvedConfig, hooks: HookDispatcher) -> Result<Self> {
        let snapshot = paths::entries_in(&config.home);
        let store = SnapshotStore::open(snapshot.clone())
            .await
            .with_context(|| format!("Failed to open entry store: {}", snapshot.display()))?;

        let providers = Providers::from_config(config);
        debug!(?providers, "Configured providers");

        Ok(Self::new(
            Arc::new(store),
            providers,
            hooks,
            AudioStore::new(paths::audio_in(&config.home)),
            reporting_offset(config.analytics.utc_offset_minutes),
        ))
    }

    pub fn pipeline(&self) -> &Arc<EnrichmentPipeline> {
        &self.pipeline
    }

    pub fn hooks(&self) -> &HookDispatcher {
        &self.hooks
    }

    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    /// Create an entry and schedule its enrichment.
    ///
    /// Returns once the entry is stored and `entry_created` observers have run.
    #[instrument(skip(self, new))]
    pub async fn ingest(
        &self,
        new: NewEntry,
    ) -> Result<(EntryId, Option<EnrichmentTask>), PipelineError> {
        let entry = self.store.create(new).await?;
        let id = entry.id;
        info!(entry_id = id, has_audio = entry.audio_ref.is_some(), "Entry captured");

        if !self.hooks.is_empty() {
            let contributions = self.hooks.dispatch(HookCall::EntryCreated(&entry)).await;
            if !contributions.is_empty() {
                if let Err(e) = self
                    .store
                    .update(
                        id,
                        Box::new(move |entry| {
                            entry.attach_context(HookPoint::EntryCreated, contributions)
                        }),
                    )
                    .await
                {
                    warn!(entry_id = id, error = %e, "Failed to attach observer context");
                }
            }
        }

        let task = self.pipeline.spawn_automatic(id).await;
        Ok((id, task))
    }

    /// Import an audio file and ingest an entry referencing it
    pub async fn ingest_audio(
        &self,
        source: &Path,
        mut new: NewEntry,
    ) -> Result<(EntryId, Option<EnrichmentTask>)> {
        let audio_ref = self
            .audio
            .import(source)
            .await
            .with_context(|| format!("Failed to import audio: {}", source.display()))?;
        new.audio_ref = Some(audio_ref);
        Ok(self.ingest(new).await?)
    }

    /// Schedule automatic runs for every unprocessed entry not already in flight
    pub async fn enrich_pending(&self) -> Result<Vec<EnrichmentTask>, PipelineError> {
        let mut tasks = Vec::new();
        for entry in self.store.list_all().await? {
            if entry.processed {
                continue;
            }
            if let Some(task) = self.pipeline.spawn_automatic(entry.id).await {
                tasks.push(task);
            }
        }
        info!(scheduled = tasks.len(), "Scheduled pending enrichment");
        Ok(tasks)
    }

    pub async fn get(&self, id: EntryId) -> Result<Entry, PipelineError> {
        self.store.get(id).await?.ok_or(PipelineError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Entry>, PipelineError> {
        Ok(self.store.list_all().await?)
    }

    pub async fn state(&self, id: EntryId) -> Result<EntryState, PipelineError> {
        self.pipeline.state(id).await
    }

    pub async fn retranscribe(&self, id: EntryId) -> Result<Entry, PipelineError> {
        self.pipeline.retranscribe(id).await
    }

    pub async fn reanalyze(&self, id: EntryId) -> Result<Entry, PipelineError> {
        self.pipeline.reanalyze(id).await
    }

    pub async fn reembed(&self, id: EntryId) -> Result<Entry, PipelineError> {
        self.pipeline.reembed(id).await
    }

    /// Remove an entry and its audio file, unless another entry shares it
    #[instrument(skip(self))]
    pub async fn delete(&self, id: EntryId) -> Result<Entry, PipelineError> {
        let entry = self.store.delete(id).await?;
        self.pipeline.forget(id).await;

        if let Some(audio_ref) = &entry.audio_ref {
            // Identical imports share one content-addressed file.
            let shared = self
                .store
                .list_all()
                .await?
                .iter()
                .any(|other| other.audio_ref.as_ref() == Some(audio_ref));

            if shared {
                debug!(audio = %audio_ref, "Audio still referenced, keeping file");
            } else {
                match self.audio.remove(audio_ref).await {
                    Ok(true) => debug!(audio = %audio_ref, "Removed audio"),
                    Ok(false) => debug!(audio = %audio_ref, "Audio already gone"),
                    Err(e) => warn!(audio = %audio_ref, error = %e, "Failed to remove audio"),
                }
            }
        }

        info!(entry_id = id, "Entry deleted");
        Ok(entry)
    }

    pub async fn search(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        self.search.search(query, options).await
    }

    pub async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<EntryView>, PipelineError> {
        self.search.keyword(query, limit).await
    }

    pub async fn patterns(&self, days: i64) -> Result<PatternOutcome, PipelineError> {
        Ok(self.analytics.patterns(days).await?)
    }

    pub async fn digest(
        &self,
        period: DigestPeriod,
        date: Option<NaiveDate>,
        with_narrative: bool,
    ) -> Result<Digest, PipelineError> {
        Ok(self.analytics.digest(period, date, with_narrative).await?)
    }
}
