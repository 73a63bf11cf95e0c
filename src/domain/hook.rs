//! Hook points and the advisory results observers attach to entries and digests.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Checkpoints at which observers are invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// An entry was just created by ingestion
    EntryCreated,

    /// An entry's analysis fields were just written
    EntryAnalyzed,

    /// A digest is being generated
    Digest,
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPoint::EntryCreated => write!(f, "entry_created"),
            HookPoint::EntryAnalyzed => write!(f, "entry_analyzed"),
            HookPoint::Digest => write!(f, "digest"),
        }
    }
}

/// A non-null result returned by one observer at one hook point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookContribution {
    /// Name of the observer that produced the result
    pub observer: String,

    /// Hook point that produced the result
    pub hook: HookPoint,

    /// Observer-defined payload
    pub result: Value,
}
