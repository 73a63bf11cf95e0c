//! Canonical file locations under the murmur data directory.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! | Location | Purpose |
//! |----------|---------|
//! | `entries.json` | Entry store snapshot |
//! | `audio/` | Imported audio files, named by content hash |
//! | `sessions.json` | Exercise session log plugin |
//! | `activity.json` | Daily activity plugin |

use std::path::{Path, PathBuf};

/// Entry snapshot file under `home`
pub fn entries_in(home: &Path) -> PathBuf {
    home.join("entries.json")
}

/// Audio directory under `home`
pub fn audio_in(home: &Path) -> PathBuf {
    home.join("audio")
}

/// Session log file under `home`
pub fn sessions_in(home: &Path) -> PathBuf {
    home.join("sessions.json")
}

/// Activity log file under `home`
pub fn activity_in(home: &Path) -> PathBuf {
    home.join("activity.json")
}
