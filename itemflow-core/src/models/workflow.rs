//! Workflow data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// Well-known template identifiers for workflow definition items
pub mod template_ids {
    /// Workflow root definition
    pub const WORKFLOW: &str = "workflow";
    /// State definition (child of a workflow)
    pub const WORKFLOW_STATE: &str = "workflow-state";
    /// Command definition (child of a state)
    pub const WORKFLOW_COMMAND: &str = "workflow-command";
    /// Action definition (child of a command or a state)
    pub const WORKFLOW_ACTION: &str = "workflow-action";
}

/// Well-known field identifiers read from definition items
pub mod field_ids {
    /// Target state id on a command (or a `route-to-state` action)
    pub const NEXT_STATE: &str = "next state";
    /// Checkbox on a command: skip the comment prompt
    pub const SUPPRESS_COMMENT: &str = "suppress comment";
    /// Initial state id on a workflow
    pub const INITIAL_STATE: &str = "initial state";
    /// Checkbox on a state: the state is final
    pub const FINAL: &str = "final";
    /// Pipe-separated publishing targets on a state
    pub const PREVIEW_PUBLISHING_TARGETS: &str = "preview publishing targets";
    /// Plugin identifier of the appearance evaluator on a command
    pub const APPEARANCE_EVALUATOR_TYPE: &str = "appearance evaluator type";
    /// Plugin identifier on an action definition
    pub const ACTION_TYPE: &str = "type";
}

/// Comment field used for plain-text comments
pub const COMMENTS_FIELD: &str = "Comments";

/// Default comment recorded when an item enters its workflow
pub const DEFAULT_ITEM_CREATED_COMMENT: &str = "Item created";

/// Named comment values attached to a transition
pub type CommentFields = BTreeMap<String, String>;

/// Build comment fields from a single free-text comment
pub fn comment_fields(comments: &str) -> CommentFields {
    let mut fields = CommentFields::new();
    fields.insert(COMMENTS_FIELD.to_string(), comments.to_string());
    fields
}

/// Reference to one version of a content item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemRef {
    /// Item identifier
    pub id: String,
    /// Version number (1-based)
    pub version: u32,
}

impl ItemRef {
    pub fn new(id: impl Into<String>, version: u32) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id, self.version)
    }
}

/// The actor an operation is evaluated for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Read-only view of a repository item (definition or content)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique item identifier
    pub id: String,
    /// Item name
    pub name: String,
    /// Display name, falls back to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Icon path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Template the item is based on
    pub template: String,
    /// Structural parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Field values keyed by field identifier
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl Item {
    /// Field value, empty when absent
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    /// Checkbox field value ("1" means checked)
    pub fn checkbox(&self, name: &str) -> bool {
        self.field(name) == "1"
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn icon(&self) -> &str {
        self.icon.as_deref().unwrap_or("")
    }
}

/// Workflow binding persisted on an item version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub workflow_id: String,
    pub state_id: String,
}

impl WorkflowInfo {
    pub fn new(workflow_id: impl Into<String>, state_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            state_id: state_id.into(),
        }
    }
}

/// A state as seen by hosts, built fresh from its definition item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub state_id: String,
    pub display_name: String,
    pub icon: String,
    pub is_final: bool,
    pub preview_targets: Vec<String>,
}

impl WorkflowState {
    pub fn from_definition(item: &Item) -> Self {
        let preview_targets = item
            .field(field_ids::PREVIEW_PUBLISHING_TARGETS)
            .split('|')
            .map(str::trim)
            .filter(|target| !target.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            state_id: item.id.clone(),
            display_name: item.display_name().to_string(),
            icon: item.icon().to_string(),
            is_final: item.checkbox(field_ids::FINAL),
            preview_targets,
        }
    }

    /// Whether the state lists `target` among its preview publishing targets
    pub fn has_preview_target(&self, target: &str) -> bool {
        self.preview_targets
            .iter()
            .any(|t| t.eq_ignore_ascii_case(target))
    }
}

/// A command available from a state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowCommand {
    pub command_id: String,
    pub display_name: String,
    pub icon: String,
    pub has_ui: bool,
    pub suppress_comment: bool,
}

/// Audit record of one realized state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique entry id
    pub id: Uuid,
    /// Item version the transition applied to
    pub item: ItemRef,
    /// Previous state (None when the item entered the workflow)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_state_id: Option<String>,
    /// New state
    pub new_state_id: String,
    /// Comments supplied with the transition
    #[serde(default)]
    pub comment_fields: CommentFields,
    /// Who performed the transition
    pub user: String,
    /// When the transition was recorded
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        item: ItemRef,
        old_state_id: Option<String>,
        new_state_id: String,
        comment_fields: CommentFields,
        user: &Principal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item,
            old_state_id,
            new_state_id,
            comment_fields,
            user: user.name.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Orchestrator phase of a command or state-entry run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// No command was resolved
    NoCommand,
    /// Looking up the command definition
    Resolving,
    /// Running the action pipeline
    Executing,
    /// Persisting the new state
    Transitioning,
    /// Pipeline finished
    Completed,
    /// Pipeline is waiting for external input
    Suspended,
    /// An action aborted the pipeline
    Aborted,
}

/// Why an execution did not succeed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The command is not defined on the current state
    CommandNotFound,
    /// Neither an override nor the command define a next state
    MissingNextState,
    /// An action aborted the pipeline
    Aborted,
}

/// Outcome of an execute/resume call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Whether the command completed without failure
    pub succeeded: bool,
    /// Human-readable message
    pub message: String,
    /// State the item is in after the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_state_id: Option<String>,
    /// False while a suspended pipeline is still pending
    pub is_completed: bool,
    /// Final orchestrator phase
    pub phase: ExecutionPhase,
    /// Failure classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Token to resume a suspended pipeline with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<Uuid>,
}

impl WorkflowResult {
    pub fn failed(failure: FailureKind, message: impl Into<String>, phase: ExecutionPhase) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
            next_state_id: None,
            is_completed: true,
            phase,
            failure: Some(failure),
            resume_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_item(fields: &[(&str, &str)]) -> Item {
        Item {
            id: "review".to_string(),
            name: "Review".to_string(),
            display_name: Some("Awaiting Review".to_string()),
            icon: None,
            template: template_ids::WORKFLOW_STATE.to_string(),
            parent: Some("sample".to_string()),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_state_from_definition() {
        let item = state_item(&[
            (field_ids::FINAL, "1"),
            (field_ids::PREVIEW_PUBLISHING_TARGETS, "preview| staging |"),
        ]);
        let state = WorkflowState::from_definition(&item);

        assert_eq!(state.state_id, "review");
        assert_eq!(state.display_name, "Awaiting Review");
        assert!(state.is_final);
        assert_eq!(state.preview_targets, vec!["preview", "staging"]);
        assert!(state.has_preview_target("STAGING"));
        assert!(!state.has_preview_target("web"));
    }

    #[test]
    fn test_missing_fields_read_as_empty() {
        let item = state_item(&[]);
        assert_eq!(item.field(field_ids::NEXT_STATE), "");
        assert!(!item.checkbox(field_ids::SUPPRESS_COMMENT));
        assert!(WorkflowState::from_definition(&item)
            .preview_targets
            .is_empty());
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&ExecutionPhase::NoCommand).unwrap();
        assert_eq!(json, "\"no_command\"");
    }

    #[test]
    fn test_item_ref_display() {
        assert_eq!(ItemRef::new("home", 3).to_string(), "home#3");
    }
}
