//! Collaborator interfaces consumed by the engine

use crate::models::{AccessRight, CommentFields, HistoryEntry, Item, ItemRef, Principal, WorkflowInfo};
use anyhow::Result;
use async_trait::async_trait;

/// Content repository access
///
/// Definition items (workflows, states, commands, actions) are read-only
/// configuration; the only thing the engine writes is [`WorkflowInfo`].
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Get an item by id
    async fn get_item(&self, id: &str) -> Result<Option<Item>>;

    /// Structural children of an item in stored order
    async fn get_children(&self, id: &str) -> Result<Vec<Item>>;

    /// All versions of a content item
    async fn get_versions(&self, id: &str) -> Result<Vec<ItemRef>>;

    /// Whether `item` is based on `template_id` or a template inheriting from it
    async fn descends_from(&self, item: &Item, template_id: &str) -> Result<bool>;

    /// Workflow binding of an item version
    async fn get_workflow_info(&self, item: &ItemRef) -> Result<Option<WorkflowInfo>>;

    /// Persist the workflow binding of an item version
    async fn set_workflow_info(&self, item: &ItemRef, info: WorkflowInfo) -> Result<()>;

    /// Item versions currently sitting in a state
    async fn get_items_in_state(&self, workflow_id: &str, state_id: &str) -> Result<Vec<ItemRef>>;

    /// Ids of every workflow definition in the repository
    async fn get_workflow_ids(&self) -> Result<Vec<String>>;

    /// Release an edit lock held by `principal`; no-op otherwise
    async fn release_edit_lock(&self, item: &ItemRef, principal: &Principal) -> Result<()>;
}

/// Audit trail persistence
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_history(
        &self,
        item: &ItemRef,
        old_state_id: Option<&str>,
        new_state_id: &str,
        comment_fields: &CommentFields,
        principal: &Principal,
    ) -> Result<()>;

    async fn clear_history(&self, item: &ItemRef) -> Result<()>;

    /// Entries for an item version, oldest first
    async fn get_history(&self, item: &ItemRef) -> Result<Vec<HistoryEntry>>;
}

/// Decides whether a principal holds a right on an item
#[async_trait]
pub trait AuthorizationOracle: Send + Sync {
    async fn is_allowed(&self, item: &Item, right: &AccessRight, principal: &Principal) -> Result<bool>;
}
