//! Command resolution for a workflow state

use crate::models::{
    field_ids, template_ids, AccessRight, Item, ItemRef, Principal, WorkflowCommand,
};
use crate::workflow::plugins::PluginLoader;
use crate::workflow::store::{AuthorizationOracle, ItemStore};
use anyhow::Result;
use std::sync::Arc;

/// Lists and looks up the commands a principal may use from a state
#[derive(Clone)]
pub struct CommandResolver {
    items: Arc<dyn ItemStore>,
    oracle: Arc<dyn AuthorizationOracle>,
    plugins: Arc<dyn PluginLoader>,
}

impl CommandResolver {
    pub fn new(
        items: Arc<dyn ItemStore>,
        oracle: Arc<dyn AuthorizationOracle>,
        plugins: Arc<dyn PluginLoader>,
    ) -> Self {
        Self {
            items,
            oracle,
            plugins,
        }
    }

    /// Commands of `state_id` usable by `principal`, in stored order
    ///
    /// A command whose appearance evaluator cannot be resolved is still listed
    /// with its own definition fields; the failure is logged.
    pub async fn list_commands(
        &self,
        state_id: &str,
        item: &ItemRef,
        principal: &Principal,
    ) -> Result<Vec<WorkflowCommand>> {
        let mut commands = Vec::new();
        for definition in self.executable_commands(state_id, principal).await? {
            commands.push(self.describe(&definition, item));
        }
        Ok(commands)
    }

    /// Command definition `command_id` under `state_id`, if `principal` may execute it
    pub async fn find_command(
        &self,
        state_id: &str,
        command_id: &str,
        principal: &Principal,
    ) -> Result<Option<Item>> {
        Ok(self
            .executable_commands(state_id, principal)
            .await?
            .into_iter()
            .find(|definition| definition.id == command_id))
    }

    async fn executable_commands(&self, state_id: &str, principal: &Principal) -> Result<Vec<Item>> {
        if self.items.get_item(state_id).await?.is_none() {
            return Ok(Vec::new());
        }

        let mut commands = Vec::new();
        for child in self.items.get_children(state_id).await? {
            if !self
                .items
                .descends_from(&child, template_ids::WORKFLOW_COMMAND)
                .await?
            {
                continue;
            }
            if !self
                .oracle
                .is_allowed(&child, &AccessRight::WorkflowCommandExecute, principal)
                .await?
            {
                tracing::debug!(command = %child.id, user = %principal, "Command hidden: execute denied");
                continue;
            }
            commands.push(child);
        }
        Ok(commands)
    }

    fn describe(&self, definition: &Item, item: &ItemRef) -> WorkflowCommand {
        let mut command = WorkflowCommand {
            command_id: definition.id.clone(),
            display_name: definition.display_name().to_string(),
            icon: definition.icon().to_string(),
            has_ui: false,
            suppress_comment: definition.checkbox(field_ids::SUPPRESS_COMMENT),
        };

        let evaluator_type = definition.field(field_ids::APPEARANCE_EVALUATOR_TYPE).trim();
        if evaluator_type.is_empty() {
            return command;
        }

        match self.plugins.resolve_evaluator(evaluator_type) {
            Some(evaluator) => {
                command.display_name = evaluator.command_name(item, definition);
                command.icon = evaluator.command_icon(item, definition);
                command.has_ui = evaluator.has_ui(item, definition);
                command.suppress_comment = evaluator.suppress_comments(item, definition);
            }
            None => {
                tracing::error!(
                    command = %definition.id,
                    evaluator = evaluator_type,
                    "Type \"{}\" not found.",
                    evaluator_type
                );
            }
        }
        command
    }
}
