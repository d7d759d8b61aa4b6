//! Built-in pipeline actions

use crate::models::{field_ids, Item};
use crate::workflow::pipeline::PipelineContext;
use crate::workflow::plugins::{PluginRegistry, WorkflowAction};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub const REQUIRE_COMMENT: &str = "require-comment";
pub const STAY_IN_PLACE: &str = "stay-in-place";
pub const AWAIT_APPROVAL: &str = "await-approval";
pub const ROUTE_TO_STATE: &str = "route-to-state";
pub const SET_PARAMETER: &str = "set-parameter";

/// Field on a `set-parameter` definition naming the parameter
pub const PARAMETER_FIELD: &str = "parameter";
/// Field on a `set-parameter` definition holding the value
pub const VALUE_FIELD: &str = "value";

/// Register every built-in action
pub fn register_builtin_actions(registry: &PluginRegistry) {
    registry.register_action(REQUIRE_COMMENT, || Arc::new(RequireComment));
    registry.register_action(STAY_IN_PLACE, || Arc::new(StayInPlace));
    registry.register_action(AWAIT_APPROVAL, || Arc::new(AwaitApproval));
    registry.register_action(ROUTE_TO_STATE, || Arc::new(RouteToState));
    registry.register_action(SET_PARAMETER, || Arc::new(SetParameter));
}

/// Aborts when no comment was given
pub struct RequireComment;

#[async_trait]
impl WorkflowAction for RequireComment {
    async fn process(&self, _definition: &Item, context: &mut PipelineContext) -> Result<()> {
        if context.has_blank_comments() {
            context.abort("A comment is required.");
        }
        Ok(())
    }
}

/// Keeps the item in its current state ("save as draft")
pub struct StayInPlace;

#[async_trait]
impl WorkflowAction for StayInPlace {
    async fn process(&self, definition: &Item, context: &mut PipelineContext) -> Result<()> {
        context.cancel_transition = true;
        context.message = Some(format!(
            "Transition cancelled by \"{}\".",
            definition.display_name()
        ));
        Ok(())
    }
}

/// Suspends the pipeline until a human resumes it
pub struct AwaitApproval;

#[async_trait]
impl WorkflowAction for AwaitApproval {
    async fn process(&self, definition: &Item, context: &mut PipelineContext) -> Result<()> {
        let token = context.suspend();
        context.message = Some(format!(
            "Waiting for \"{}\" to be approved.",
            definition.display_name()
        ));
        tracing::info!(
            item = %context.data_item,
            token = %token,
            "Pipeline waiting for approval"
        );
        Ok(())
    }
}

/// Chooses the next state from the action definition's "next state" field
pub struct RouteToState;

#[async_trait]
impl WorkflowAction for RouteToState {
    async fn process(&self, definition: &Item, context: &mut PipelineContext) -> Result<()> {
        let target = definition.field(field_ids::NEXT_STATE).trim();
        if !target.is_empty() {
            context.next_state_override = Some(target.to_string());
        }
        Ok(())
    }
}

/// Copies a named value into the context parameters
pub struct SetParameter;

#[async_trait]
impl WorkflowAction for SetParameter {
    async fn process(&self, definition: &Item, context: &mut PipelineContext) -> Result<()> {
        let name = definition.field(PARAMETER_FIELD).trim();
        if !name.is_empty() {
            context
                .parameters
                .insert(name.to_string(), definition.field(VALUE_FIELD).to_string());
        }
        Ok(())
    }
}

/// Stands in for an action whose type could not be resolved
pub struct MissingAction {
    pub type_name: String,
}

#[async_trait]
impl WorkflowAction for MissingAction {
    async fn process(&self, _definition: &Item, context: &mut PipelineContext) -> Result<()> {
        context.abort(format!("Action type \"{}\" not found.", self.type_name));
        Ok(())
    }
}
