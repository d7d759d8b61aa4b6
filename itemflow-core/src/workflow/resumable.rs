//! Resumable operations: completion callbacks and suspended pipelines
//!
//! Both are stored under a [`ContinuationKey`] (a generated token plus the
//! host's session discriminator) so a later call, possibly from another
//! request or process, can pick them up. Nothing expires on its own; hosts
//! call [`ResumableStore::end_session`] when a session closes.

use crate::models::{CommentFields, ItemRef, Principal};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Stable identity of a resumable operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContinuationKey {
    pub token: Uuid,
    pub session: String,
}

impl ContinuationKey {
    pub fn new(token: Uuid, session: impl Into<String>) -> Self {
        Self {
            token,
            session: session.into(),
        }
    }

    /// Fresh key for a session
    pub fn generate(session: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4(), session)
    }
}

impl fmt::Display for ContinuationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session, self.token)
    }
}

/// A caller's completion callback, described by name so it survives a restart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRegistration {
    pub key: ContinuationKey,
    /// Completion handler identifier in the plugin registry
    pub handler: String,
    /// Opaque data handed back to the handler
    #[serde(default)]
    pub payload: serde_json::Value,
    pub registered_at: DateTime<Utc>,
}

impl CallbackRegistration {
    pub fn new(key: ContinuationKey, handler: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key,
            handler: handler.into(),
            payload,
            registered_at: Utc::now(),
        }
    }
}

/// Which pipeline a suspended run belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingPipeline {
    /// Command pipeline, resolved while the item was in `from_state`
    Command { command_id: String, from_state: String },
    /// State-entry pipeline of `state_id`
    StateEntry { state_id: String },
}

/// Everything needed to run the remainder of a suspended pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingExecution {
    pub key: ContinuationKey,
    pub workflow_id: String,
    pub item: ItemRef,
    pub principal: Principal,
    pub pipeline: PendingPipeline,
    #[serde(default)]
    pub comment_fields: CommentFields,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_state_override: Option<String>,
    /// Index of the first action still to run
    pub resume_at: usize,
    /// Completion callback to append when the pipeline is rebuilt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<ContinuationKey>,
    pub suspended_at: DateTime<Utc>,
}

/// Storage for resumable operations
#[async_trait]
pub trait ResumableStore: Send + Sync {
    async fn register_callback(&self, registration: CallbackRegistration) -> Result<()>;

    /// Remove and return a callback registration
    async fn take_callback(&self, key: &ContinuationKey) -> Result<Option<CallbackRegistration>>;

    async fn save_pending(&self, pending: PendingExecution) -> Result<()>;

    /// Remove and return a suspended run
    async fn take_pending(&self, key: &ContinuationKey) -> Result<Option<PendingExecution>>;

    /// Suspended runs of a session
    async fn list_pending(&self, session: &str) -> Result<Vec<PendingExecution>>;

    /// Drop every registration of a session, returning how many were removed
    async fn end_session(&self, session: &str) -> Result<usize>;
}

/// Process-local store for single-process hosts
#[derive(Clone, Default)]
pub struct InMemoryResumableStore {
    callbacks: Arc<DashMap<ContinuationKey, CallbackRegistration>>,
    pending: Arc<DashMap<ContinuationKey, PendingExecution>>,
}

impl InMemoryResumableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResumableStore for InMemoryResumableStore {
    async fn register_callback(&self, registration: CallbackRegistration) -> Result<()> {
        self.callbacks.insert(registration.key.clone(), registration);
        Ok(())
    }

    async fn take_callback(&self, key: &ContinuationKey) -> Result<Option<CallbackRegistration>> {
        Ok(self.callbacks.remove(key).map(|(_key, registration)| registration))
    }

    async fn save_pending(&self, pending: PendingExecution) -> Result<()> {
        self.pending.insert(pending.key.clone(), pending);
        Ok(())
    }

    async fn take_pending(&self, key: &ContinuationKey) -> Result<Option<PendingExecution>> {
        Ok(self.pending.remove(key).map(|(_key, pending)| pending))
    }

    async fn list_pending(&self, session: &str) -> Result<Vec<PendingExecution>> {
        let mut pending: Vec<PendingExecution> = self
            .pending
            .iter()
            .filter(|entry| entry.key().session == session)
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|p| p.suspended_at);
        Ok(pending)
    }

    async fn end_session(&self, session: &str) -> Result<usize> {
        let before = self.callbacks.len() + self.pending.len();
        self.callbacks.retain(|key, _| key.session != session);
        self.pending.retain(|key, _| key.session != session);
        let removed = before - (self.callbacks.len() + self.pending.len());

        tracing::info!(session = session, removed = removed, "Session ended");
        Ok(removed)
    }
}
