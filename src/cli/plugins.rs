//! Plugin CLI subcommands.
//!
//! - `murmur session log` - Record an exercise session
//! - `murmur session list` - Show logged sessions
//! - `murmur activity record` - Record a day's steps and active minutes

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Subcommand;

use crate::config::{paths, ResolvedConfig};
use crate::core::reporting_offset;
use crate::plugins::{ActivityTracker, DailyActivity, NewSession, SessionLog};

use super::print_json;

/// Session log subcommands
#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Record a session
    Log {
        /// Session category (e.g. run, yoga)
        #[arg(short, long)]
        category: String,

        /// Duration in minutes
        #[arg(short, long, allow_negative_numbers = true)]
        minutes: f64,

        /// Free-form note
        #[arg(short, long)]
        note: Option<String>,

        /// When the session happened (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// List logged sessions
    List,
}

/// Activity subcommands
#[derive(Subcommand, Debug)]
pub enum ActivityCommands {
    /// Record (or replace) one day's metrics
    Record {
        /// Day (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        /// Step count
        #[arg(short, long)]
        steps: u64,

        /// Active minutes
        #[arg(short, long, default_value = "0")]
        active_minutes: u32,
    },
}

pub async fn execute_session(cfg: &ResolvedConfig, command: SessionCommands) -> Result<()> {
    let log = SessionLog::load(
        paths::sessions_in(&cfg.home),
        reporting_offset(cfg.analytics.utc_offset_minutes),
    )
    .await?;

    match command {
        SessionCommands::Log {
            category,
            minutes,
            note,
            at,
        } => {
            let session = log
                .log(NewSession {
                    category,
                    duration_minutes: minutes,
                    note,
                    at,
                })
                .await?;
            print_json(&session)
        }
        SessionCommands::List => print_json(&log.sessions().await),
    }
}

pub async fn execute_activity(cfg: &ResolvedConfig, command: ActivityCommands) -> Result<()> {
    let tracker = ActivityTracker::load(
        paths::activity_in(&cfg.home),
        reporting_offset(cfg.analytics.utc_offset_minutes),
    )
    .await?;

    match command {
        ActivityCommands::Record {
            date,
            steps,
            active_minutes,
        } => {
            let day = tracker
                .record(DailyActivity {
                    date,
                    steps,
                    active_minutes,
                })
                .await?;
            print_json(&day)
        }
    }
}
