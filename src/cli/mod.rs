//! Command-line interface for murmur.
//!
//! Provides commands for capturing entries, driving enrichment by hand,
//! searching, and producing pattern reports and digests. Data commands
//! print JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;

use crate::config::{self, paths, ResolvedConfig};
use crate::core::{reporting_offset, HookDispatcher, Journal, SearchOptions};
use crate::domain::{DigestPeriod, EntryId, EntryView, NewEntry};
use crate::plugins::BuiltinPlugins;

pub mod plugins;

/// murmur - Voice-note enrichment, search and digests
#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture a new entry and enrich it
    Add {
        /// Transcript text (for typed notes)
        #[arg(short, long, conflicts_with = "audio")]
        text: Option<String>,

        /// Audio file to import
        #[arg(short, long)]
        audio: Option<PathBuf>,

        /// Capturing device label
        #[arg(long)]
        device: Option<String>,

        /// Classification tag (e.g. work, personal)
        #[arg(short, long)]
        context: Option<String>,

        /// Recording time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// List entries
    List {
        /// Maximum number of entries to show (most recent first)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one entry in full
    Show {
        id: EntryId,

        /// Include the raw embedding vector
        #[arg(long)]
        embedding: bool,
    },

    /// Delete an entry and its audio
    Delete { id: EntryId },

    /// Re-run transcription (and everything after it)
    Transcribe { id: EntryId },

    /// Re-run analysis (and embedding)
    Analyze { id: EntryId },

    /// Recompute the embedding
    Embed { id: EntryId },

    /// Enrich every entry that has not finished processing
    Process,

    /// Search entries
    Search {
        query: String,

        /// Minimum cosine similarity
        #[arg(long)]
        threshold: Option<f32>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Substring match instead of semantic search
        #[arg(long)]
        keyword: bool,
    },

    /// Topic, mood and time-of-day patterns over a trailing window
    Patterns {
        /// Window length in days
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Daily or weekly digest
    Digest {
        #[arg(value_enum)]
        period: PeriodArg,

        /// Any date inside the window (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Ask the narrative provider for a written summary
        #[arg(long)]
        narrative: bool,
    },

    /// Exercise session log
    Session {
        #[command(subcommand)]
        command: plugins::SessionCommands,
    },

    /// Daily activity metrics
    Activity {
        #[command(subcommand)]
        command: plugins::ActivityCommands,
    },

    /// Show resolved configuration
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PeriodArg {
    Daily,
    Weekly,
}

impl From<PeriodArg> for DigestPeriod {
    fn from(p: PeriodArg) -> Self {
        match p {
            PeriodArg::Daily => DigestPeriod::Daily,
            PeriodArg::Weekly => DigestPeriod::Weekly,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Add {
                text,
                audio,
                device,
                context,
                at,
            } => {
                let new = NewEntry {
                    timestamp: at,
                    device,
                    context,
                    audio_ref: None,
                    transcript: text,
                };
                add_entry(&open_journal(cfg).await?, new, audio).await
            }
            Commands::List { limit } => list_entries(&open_journal(cfg).await?, limit).await,
            Commands::Show { id, embedding } => {
                show_entry(&open_journal(cfg).await?, id, embedding).await
            }
            Commands::Delete { id } => {
                let entry = open_journal(cfg).await?.delete(id).await?;
                eprintln!("[Entry {} deleted]", entry.id);
                Ok(())
            }
            Commands::Transcribe { id } => {
                let entry = open_journal(cfg).await?.retranscribe(id).await?;
                print_json(&EntryView::from(&entry))
            }
            Commands::Analyze { id } => {
                let entry = open_journal(cfg).await?.reanalyze(id).await?;
                print_json(&EntryView::from(&entry))
            }
            Commands::Embed { id } => {
                let entry = open_journal(cfg).await?.reembed(id).await?;
                print_json(&EntryView::from(&entry))
            }
            Commands::Process => process_pending(&open_journal(cfg).await?).await,
            Commands::Search {
                query,
                threshold,
                limit,
                keyword,
            } => {
                let journal = open_journal(cfg).await?;
                let limit = limit.unwrap_or(cfg.search.limit);
                if keyword {
                    print_json(&journal.keyword_search(&query, limit).await?)
                } else {
                    let options = SearchOptions {
                        threshold: threshold.unwrap_or(cfg.search.threshold),
                        limit,
                    };
                    print_json(&journal.search(&query, options).await?)
                }
            }
            Commands::Patterns { days } => {
                let days = days.unwrap_or(cfg.analytics.default_days);
                print_json(&open_journal(cfg).await?.patterns(days).await?)
            }
            Commands::Digest {
                period,
                date,
                narrative,
            } => {
                let digest = open_journal(cfg)
                    .await?
                    .digest(period.into(), date, narrative)
                    .await?;
                print_json(&digest)
            }
            Commands::Session { command } => plugins::execute_session(cfg, command).await,
            Commands::Activity { command } => plugins::execute_activity(cfg, command).await,
            Commands::Config => show_config(cfg),
        }
    }
}

/// Open the journal with the built-in plugins registered
async fn open_journal(cfg: &ResolvedConfig) -> Result<Journal> {
    let plugins = BuiltinPlugins::load(&cfg.home, reporting_offset(cfg.analytics.utc_offset_minutes))
        .await?;

    let mut hooks = HookDispatcher::new();
    plugins.register(&mut hooks)?;

    Journal::open(cfg, hooks).await
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Capture an entry and wait for its enrichment
async fn add_entry(journal: &Journal, new: NewEntry, audio: Option<PathBuf>) -> Result<()> {
    let (id, task) = match audio {
        Some(path) => journal.ingest_audio(&path, new).await?,
        None => {
            if new.transcript.as_deref().map_or(true, |t| t.trim().is_empty()) {
                anyhow::bail!("Nothing to capture. Use --text <TEXT> or --audio <PATH>");
            }
            journal.ingest(new).await?
        }
    };
    eprintln!("[Entry {} captured]", id);

    // The process exits after this command, so wait for enrichment.
    if let Some(task) = task {
        let state = task.await.context("Enrichment task panicked")?;
        eprintln!("[Entry {} {}]", id, state);
    }

    print_json(&journal.get(id).await?)
}

/// List the most recent entries
async fn list_entries(journal: &Journal, limit: usize) -> Result<()> {
    let entries = journal.list().await?;
    let views: Vec<EntryView> = entries.iter().rev().take(limit).map(EntryView::from).collect();
    print_json(&views)
}

async fn show_entry(journal: &Journal, id: EntryId, with_embedding: bool) -> Result<()> {
    let entry = journal.get(id).await?;
    let state = journal.state(id).await?;

    if with_embedding {
        print_json(&json!({ "state": state, "entry": entry }))
    } else {
        print_json(&json!({
            "state": state,
            "entry": EntryView::from(&entry),
            "hook_context": entry.hook_context,
        }))
    }
}

/// Run every pending enrichment to completion
async fn process_pending(journal: &Journal) -> Result<()> {
    let tasks = journal.enrich_pending().await?;
    let mut states = Vec::with_capacity(tasks.len());
    for task in tasks {
        let state = task.await.context("Enrichment task panicked")?;
        states.push(state.to_string());
    }
    print_json(&json!({ "scheduled": states.len(), "states": states }))
}

/// Show resolved configuration
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    let configured = |present: bool| if present { "configured" } else { "not configured" };

    println!("murmur configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Entries:  {}", paths::entries_in(&cfg.home).display());
    println!("  Audio:    {}", paths::audio_in(&cfg.home).display());
    println!("  Sessions: {}", paths::sessions_in(&cfg.home).display());
    println!("  Activity: {}", paths::activity_in(&cfg.home).display());
    println!();
    println!("Providers:");
    println!(
        "  Transcription: {}",
        match &cfg.transcription {
            Some(t) => format!("{:?} ({})", t.backend, t.model),
            None => configured(false).to_string(),
        }
    );
    println!("  API key:       {}", configured(cfg.api_key.is_some()));
    println!("  Analysis:      {}", configured(cfg.analysis.is_some()));
    println!("  Embedding:     {}", configured(cfg.embedding.is_some()));
    println!("  Narrative:     {}", configured(cfg.narrative.is_some()));
    println!();
    println!("Search:    threshold {} / limit {}", cfg.search.threshold, cfg.search.limit);
    println!(
        "Analytics: {} days / UTC offset {} min",
        cfg.analytics.default_days, cfg.analytics.utc_offset_minutes
    );

    Ok(())
}
