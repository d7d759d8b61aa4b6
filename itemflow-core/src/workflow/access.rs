//! Workflow-driven access decisions
//!
//! The workflow only constrains delete, remove-version and write. Every other
//! right is allowed here and left to the repository's own item security.

use crate::models::{AccessDecision, AccessRight, ItemRef, Principal};
use crate::services::logging::log_security_event;
use crate::workflow::store::{AuthorizationOracle, ItemStore};
use anyhow::Result;
use std::sync::Arc;

/// Resolves rights against the state definitions items sit in
#[derive(Clone)]
pub struct AccessResolver {
    items: Arc<dyn ItemStore>,
    oracle: Arc<dyn AuthorizationOracle>,
}

/// Verdict of one state definition on one version
enum StateVerdict {
    NoState,
    Allowed,
    Denied(String),
}

impl AccessResolver {
    pub fn new(items: Arc<dyn ItemStore>, oracle: Arc<dyn AuthorizationOracle>) -> Self {
        Self { items, oracle }
    }

    pub async fn resolve(
        &self,
        item: &ItemRef,
        principal: &Principal,
        right: &AccessRight,
    ) -> Result<AccessDecision> {
        let decision = match right {
            AccessRight::ItemDelete => self.resolve_delete(item, principal, right).await?,
            AccessRight::ItemRemoveVersion => {
                self.resolve_version(item, principal, right, AccessRight::WorkflowStateDelete)
                    .await?
            }
            AccessRight::ItemWrite => {
                self.resolve_version(item, principal, right, AccessRight::WorkflowStateWrite)
                    .await?
            }
            other => AccessDecision::allow(format!(
                "The workflow does not restrict the '{}' access right.",
                other
            )),
        };

        if !decision.is_allowed() {
            log_security_event("workflow-access-denied", item, principal, &decision.explanation);
        }
        Ok(decision)
    }

    /// Every version must sit in a state that grants delete
    async fn resolve_delete(
        &self,
        item: &ItemRef,
        principal: &Principal,
        right: &AccessRight,
    ) -> Result<AccessDecision> {
        let mut governed = false;
        for version in self.items.get_versions(&item.id).await? {
            match self
                .state_verdict(&version, principal, &AccessRight::WorkflowStateDelete)
                .await?
            {
                StateVerdict::NoState => {}
                StateVerdict::Allowed => governed = true,
                StateVerdict::Denied(state_id) => {
                    return Ok(AccessDecision::deny(format!(
                        "Version {} is in workflow state '{}' which does not allow the '{}' access right.",
                        version.version, state_id, right
                    )));
                }
            }
        }

        Ok(if governed {
            AccessDecision::allow(format!(
                "The workflow states of all versions allow the '{}' access right.",
                right
            ))
        } else {
            not_in_workflow(right)
        })
    }

    async fn resolve_version(
        &self,
        item: &ItemRef,
        principal: &Principal,
        right: &AccessRight,
        state_right: AccessRight,
    ) -> Result<AccessDecision> {
        Ok(match self.state_verdict(item, principal, &state_right).await? {
            StateVerdict::NoState => not_in_workflow(right),
            StateVerdict::Allowed => AccessDecision::allow(format!(
                "The workflow state allows the '{}' access right.",
                right
            )),
            StateVerdict::Denied(state_id) => AccessDecision::deny(format!(
                "The workflow state '{}' does not allow the '{}' access right.",
                state_id, right
            )),
        })
    }

    async fn state_verdict(
        &self,
        version: &ItemRef,
        principal: &Principal,
        state_right: &AccessRight,
    ) -> Result<StateVerdict> {
        let Some(info) = self.items.get_workflow_info(version).await? else {
            return Ok(StateVerdict::NoState);
        };
        if info.state_id.is_empty() {
            return Ok(StateVerdict::NoState);
        }
        let Some(state_item) = self.items.get_item(&info.state_id).await? else {
            return Ok(StateVerdict::NoState);
        };

        if self.oracle.is_allowed(&state_item, state_right, principal).await? {
            Ok(StateVerdict::Allowed)
        } else {
            Ok(StateVerdict::Denied(info.state_id))
        }
    }
}

fn not_in_workflow(right: &AccessRight) -> AccessDecision {
    AccessDecision::allow(format!(
        "The item is not in a workflow state, so the workflow does not restrict the '{}' access right.",
        right
    ))
}
