//! Versioned view context
//!
//! The settings a status fetch depends on (workspace, backend host, active
//! filter) are passed around as an explicit value. Every change bumps a
//! generation counter so work submitted under an older context can tell it is
//! stale when it settles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Settings a status fetch was issued under
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewContext {
    /// Tenant or workspace the items belong to
    pub workspace: Option<String>,

    /// Base URL relative item paths are resolved against
    pub backend: Option<String>,

    /// Active list filter
    pub filter: String,
}

impl ViewContext {
    /// Resolve an item location against the backend
    pub fn resolve(&self, location: &str) -> String {
        if location.contains("://") {
            return location.to_string();
        }
        match &self.backend {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), location.trim_start_matches('/')),
            None => location.to_string(),
        }
    }
}

/// Shared, mutable handle to the current view context
#[derive(Debug, Clone, Default)]
pub struct ContextHandle {
    current: Arc<RwLock<ViewContext>>,
    generation: Arc<AtomicU64>,
}

impl ContextHandle {
    pub fn new(context: ViewContext) -> Self {
        Self {
            current: Arc::new(RwLock::new(context)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Replace the context, invalidating every outstanding snapshot
    pub fn update(&self, context: ViewContext) -> u64 {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = context;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "ContextHandle::update: context replaced");
        generation
    }

    /// Capture the context as of now
    pub fn snapshot(&self) -> ContextSnapshot {
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        ContextSnapshot {
            context: current.clone(),
            generation: self.generation(),
            source: self.clone(),
        }
    }
}

/// A context captured at submission time
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    context: ViewContext,
    generation: u64,
    source: ContextHandle,
}

impl ContextSnapshot {
    pub fn context(&self) -> &ViewContext {
        &self.context
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The context has not changed since this snapshot was taken
    pub fn is_current(&self) -> bool {
        self.source.generation() == self.generation
    }
}
