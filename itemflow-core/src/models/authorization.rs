//! Access rights and access decisions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rights the engine asks the authorization oracle about, or resolves itself
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessRight {
    #[serde(rename = "workflow:command:execute")]
    WorkflowCommandExecute,
    #[serde(rename = "workflow:state:delete")]
    WorkflowStateDelete,
    #[serde(rename = "workflow:state:write")]
    WorkflowStateWrite,
    #[serde(rename = "item:delete")]
    ItemDelete,
    #[serde(rename = "item:removeversion")]
    ItemRemoveVersion,
    #[serde(rename = "item:write")]
    ItemWrite,
    /// Any right the workflow does not constrain
    #[serde(untagged)]
    Other(String),
}

impl AccessRight {
    pub fn name(&self) -> &str {
        match self {
            AccessRight::WorkflowCommandExecute => "workflow:command:execute",
            AccessRight::WorkflowStateDelete => "workflow:state:delete",
            AccessRight::WorkflowStateWrite => "workflow:state:write",
            AccessRight::ItemDelete => "item:delete",
            AccessRight::ItemRemoveVersion => "item:removeversion",
            AccessRight::ItemWrite => "item:write",
            AccessRight::Other(name) => name,
        }
    }

    /// Parse a right by its name; unknown names become `Other`
    pub fn parse(name: &str) -> Self {
        match name {
            "workflow:command:execute" => AccessRight::WorkflowCommandExecute,
            "workflow:state:delete" => AccessRight::WorkflowStateDelete,
            "workflow:state:write" => AccessRight::WorkflowStateWrite,
            "item:delete" => AccessRight::ItemDelete,
            "item:removeversion" => AccessRight::ItemRemoveVersion,
            "item:write" => AccessRight::ItemWrite,
            other => AccessRight::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AccessRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Allow/deny verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessPermission {
    #[serde(rename = "allow")]
    Allow,
    #[serde(rename = "deny")]
    Deny,
}

/// Verdict plus a diagnostic explanation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub permission: AccessPermission,
    pub explanation: String,
}

impl AccessDecision {
    pub fn allow(explanation: impl Into<String>) -> Self {
        Self {
            permission: AccessPermission::Allow,
            explanation: explanation.into(),
        }
    }

    pub fn deny(explanation: impl Into<String>) -> Self {
        Self {
            permission: AccessPermission::Deny,
            explanation: explanation.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self.permission, AccessPermission::Allow)
    }
}
