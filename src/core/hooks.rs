//! Observer registry and hook dispatch.
//!
//! Observers attach auxiliary context at three checkpoints: entry created,
//! entry analyzed, and digest generation. They are invoked in registration
//! order; a failing observer is logged and skipped. Results are advisory:
//! the dispatcher only returns them, it never lets an observer touch the
//! pipeline's own fields.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{DateRange, Entry, HookContribution, HookPoint};

/// Errors raised when registering an observer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Observer is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Observer '{0}' is already registered")]
    DuplicateName(String),
}

/// Identity every observer must declare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverManifest {
    /// Unique machine name, used to key contributions
    pub name: String,

    /// Human-readable label
    pub label: String,

    pub version: String,
}

impl ObserverManifest {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            version: version.into(),
        }
    }

    fn validate(&self) -> Result<(), RegistrationError> {
        if self.name.trim().is_empty() {
            return Err(RegistrationError::MissingField("name"));
        }
        if self.label.trim().is_empty() {
            return Err(RegistrationError::MissingField("label"));
        }
        if self.version.trim().is_empty() {
            return Err(RegistrationError::MissingField("version"));
        }
        Ok(())
    }
}

/// A pluggable observer. Every hook is optional; the defaults contribute nothing.
#[async_trait]
pub trait Observer: Send + Sync {
    fn manifest(&self) -> ObserverManifest;

    async fn on_entry_created(&self, _entry: &Entry) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn on_entry_analyzed(&self, _entry: &Entry) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn contribute_to_digest(
        &self,
        _entries: &[Entry],
        _range: &DateRange,
    ) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// Arguments for one dispatch
#[derive(Debug, Clone, Copy)]
pub enum HookCall<'a> {
    EntryCreated(&'a Entry),
    EntryAnalyzed(&'a Entry),
    Digest {
        entries: &'a [Entry],
        range: &'a DateRange,
    },
}

impl HookCall<'_> {
    pub fn point(&self) -> HookPoint {
        match self {
            HookCall::EntryCreated(_) => HookPoint::EntryCreated,
            HookCall::EntryAnalyzed(_) => HookPoint::EntryAnalyzed,
            HookCall::Digest { .. } => HookPoint::Digest,
        }
    }
}

struct Registered {
    manifest: ObserverManifest,
    observer: Arc<dyn Observer>,
}

/// Ordered registry of observers
#[derive(Default)]
pub struct HookDispatcher {
    observers: Vec<Registered>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer after validating its manifest
    pub fn register(&mut self, observer: Arc<dyn Observer>) -> Result<(), RegistrationError> {
        let manifest = observer.manifest();
        manifest.validate()?;

        if self.observers.iter().any(|r| r.manifest.name == manifest.name) {
            return Err(RegistrationError::DuplicateName(manifest.name));
        }

        debug!(observer = %manifest.name, version = %manifest.version, "Registered observer");
        self.observers.push(Registered { manifest, observer });
        Ok(())
    }

    /// Manifests in registration order
    pub fn manifests(&self) -> Vec<ObserverManifest> {
        self.observers.iter().map(|r| r.manifest.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Invoke every observer for one hook point and collect non-null results
    pub async fn dispatch(&self, call: HookCall<'_>) -> Vec<HookContribution> {
        let point = call.point();
        let mut contributions = Vec::new();

        for registered in &self.observers {
            let observer = &registered.observer;
            let outcome = match call {
                HookCall::EntryCreated(entry) => observer.on_entry_created(entry).await,
                HookCall::EntryAnalyzed(entry) => observer.on_entry_analyzed(entry).await,
                HookCall::Digest { entries, range } => {
                    observer.contribute_to_digest(entries, range).await
                }
            };

            match outcome {
                Ok(Some(value)) if !value.is_null() => contributions.push(HookContribution {
                    observer: registered.manifest.name.clone(),
                    hook: point,
                    result: value,
                }),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        observer = %registered.manifest.name,
                        hook = %point,
                        error = %e,
                        "Observer failed, skipping"
                    );
                }
            }
        }

        contributions
    }
}
