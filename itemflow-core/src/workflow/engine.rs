//! Workflow orchestrator
//!
//! A [`Workflow`] is a stateless facade over one workflow definition. Every
//! call re-reads state and command definitions from the item store; the only
//! durable state it writes is the item's [`WorkflowInfo`] and its history.

use crate::models::{
    comment_fields, field_ids, template_ids, CommentFields, ExecutionPhase, FailureKind,
    HistoryEntry, Item, ItemRef, Principal, WorkflowCommand, WorkflowInfo, WorkflowResult,
    WorkflowState, DEFAULT_ITEM_CREATED_COMMENT,
};
use crate::services::logging::log_transition;
use crate::workflow::actions::MissingAction;
use crate::workflow::commands::CommandResolver;
use crate::workflow::error::{EngineResult, WorkflowError};
use crate::workflow::pipeline::{Action, PipelineContext, PipelineExecutor, PipelineOutcome};
use crate::workflow::plugins::PluginLoader;
use crate::workflow::resumable::{
    CallbackRegistration, ContinuationKey, PendingExecution, PendingPipeline, ResumableStore,
};
use crate::workflow::store::{AuthorizationOracle, HistoryStore, ItemStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Session used when the caller does not name one
pub const DEFAULT_SESSION: &str = "default";

/// Collaborators shared by every workflow of a provider
#[derive(Clone)]
pub struct WorkflowServices {
    pub items: Arc<dyn ItemStore>,
    pub history: Arc<dyn HistoryStore>,
    pub oracle: Arc<dyn AuthorizationOracle>,
    pub plugins: Arc<dyn PluginLoader>,
    pub resumable: Arc<dyn ResumableStore>,
    /// Comment recorded when an item enters a workflow
    pub item_created_comment: String,
}

impl WorkflowServices {
    pub fn new(
        items: Arc<dyn ItemStore>,
        history: Arc<dyn HistoryStore>,
        oracle: Arc<dyn AuthorizationOracle>,
        plugins: Arc<dyn PluginLoader>,
        resumable: Arc<dyn ResumableStore>,
    ) -> Self {
        Self {
            items,
            history,
            oracle,
            plugins,
            resumable,
            item_created_comment: DEFAULT_ITEM_CREATED_COMMENT.to_string(),
        }
    }

    pub fn with_item_created_comment(mut self, comment: impl Into<String>) -> Self {
        self.item_created_comment = comment.into();
        self
    }
}

/// Arguments of an execute call
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub command_id: String,
    pub item: ItemRef,
    pub principal: Principal,
    pub comment_fields: CommentFields,
    pub parameters: HashMap<String, String>,
    pub session: String,
}

impl ExecuteRequest {
    pub fn new(command_id: impl Into<String>, item: ItemRef, principal: Principal) -> Self {
        Self {
            command_id: command_id.into(),
            item,
            principal,
            comment_fields: CommentFields::new(),
            parameters: HashMap::new(),
            session: DEFAULT_SESSION.to_string(),
        }
    }

    /// Single free-text comment
    pub fn with_comments(mut self, comments: &str) -> Self {
        self.comment_fields = comment_fields(comments);
        self
    }

    pub fn with_comment_fields(mut self, fields: CommentFields) -> Self {
        self.comment_fields = fields;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn in_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }
}

/// Completion callback requested by `start_execute`
#[derive(Debug, Clone)]
pub struct CompletionCallback {
    /// Completion handler identifier in the plugin registry
    pub handler: String,
    pub payload: serde_json::Value,
}

impl CompletionCallback {
    pub fn new(handler: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            handler: handler.into(),
            payload,
        }
    }
}

/// Operations a host performs against one workflow
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    fn workflow_id(&self) -> &str;

    /// Put an item into the workflow's initial state
    async fn start(&self, item: &ItemRef, principal: &Principal) -> EngineResult<WorkflowResult>;

    /// Run a command on an item
    async fn execute(&self, request: ExecuteRequest) -> EngineResult<WorkflowResult>;

    /// Like `execute`, with a callback invoked when the command pipeline completes
    async fn start_execute(
        &self,
        request: ExecuteRequest,
        callback: CompletionCallback,
    ) -> EngineResult<WorkflowResult>;

    /// Run the remainder of a suspended pipeline
    async fn resume(&self, key: &ContinuationKey) -> EngineResult<WorkflowResult>;

    async fn get_state(&self, item: &ItemRef) -> EngineResult<Option<WorkflowState>>;

    async fn get_state_by_id(&self, state_id: &str) -> EngineResult<Option<WorkflowState>>;

    async fn get_states(&self) -> EngineResult<Vec<WorkflowState>>;

    async fn get_initial_state(&self) -> EngineResult<Option<WorkflowState>>;

    /// Commands of the item's current state
    async fn get_commands(&self, item: &ItemRef, principal: &Principal)
        -> EngineResult<Vec<WorkflowCommand>>;

    async fn get_commands_for_state(
        &self,
        state_id: &str,
        item: &ItemRef,
        principal: &Principal,
    ) -> EngineResult<Vec<WorkflowCommand>>;

    async fn get_history(&self, item: &ItemRef) -> EngineResult<Vec<HistoryEntry>>;

    /// Final state, or a preview target of the current state
    async fn is_approved(&self, item: &ItemRef, target: Option<&str>) -> EngineResult<bool>;

    async fn get_items(&self, state_id: &str) -> EngineResult<Vec<ItemRef>>;

    async fn get_item_count(&self, state_id: &str) -> EngineResult<usize>;
}

/// Default workflow engine
#[derive(Clone)]
pub struct Workflow {
    workflow_id: Arc<str>,
    services: WorkflowServices,
    commands: CommandResolver,
}

impl Workflow {
    pub fn new(workflow_id: impl Into<String>, services: WorkflowServices) -> Self {
        let commands = CommandResolver::new(
            services.items.clone(),
            services.oracle.clone(),
            services.plugins.clone(),
        );
        Self {
            workflow_id: Arc::from(workflow_id.into()),
            services,
            commands,
        }
    }

    pub fn services(&self) -> &WorkflowServices {
        &self.services
    }

    async fn definition(&self) -> EngineResult<Item> {
        self.services
            .items
            .get_item(&self.workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(self.workflow_id.to_string()))
    }

    /// State definition item, if `state_id` names one
    async fn state_item(&self, state_id: &str) -> Result<Option<Item>> {
        if state_id.is_empty() {
            return Ok(None);
        }
        match self.services.items.get_item(state_id).await? {
            Some(item)
                if self
                    .services
                    .items
                    .descends_from(&item, template_ids::WORKFLOW_STATE)
                    .await? =>
            {
                Ok(Some(item))
            }
            _ => Ok(None),
        }
    }

    /// Plugin actions configured under a command or state definition
    async fn configured_actions(&self, definition: &Item) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        for child in self.services.items.get_children(&definition.id).await? {
            if !self
                .services
                .items
                .descends_from(&child, template_ids::WORKFLOW_ACTION)
                .await?
            {
                continue;
            }

            let type_name = child.field(field_ids::ACTION_TYPE).trim().to_string();
            let action = match self.services.plugins.resolve_action(&type_name) {
                Some(action) => action,
                None => {
                    tracing::error!(
                        action = %child.id,
                        action_type = %type_name,
                        "Type \"{}\" not found.",
                        type_name
                    );
                    Arc::new(MissingAction { type_name })
                }
            };
            actions.push(Action::Plugin {
                definition: child,
                action,
            });
        }
        Ok(actions)
    }

    async fn command_pipeline(
        &self,
        command: &Item,
        callback: Option<&ContinuationKey>,
    ) -> Result<Vec<Action>> {
        let mut actions = self.configured_actions(command).await?;
        actions.push(Action::Transition(self.clone()));
        if let Some(key) = callback {
            actions.push(Action::Callback {
                workflow: self.clone(),
                key: key.clone(),
            });
        }
        Ok(actions)
    }

    /// Completion step of every command pipeline
    pub(crate) async fn complete_transition(&self, context: &mut PipelineContext) -> Result<()> {
        context.phase = ExecutionPhase::Transitioning;

        let next_state = context
            .next_state_override
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                Some(context.definition_item.field(field_ids::NEXT_STATE).trim())
                    .filter(|s| !s.is_empty())
            })
            .map(str::to_string);

        let Some(next_state) = next_state else {
            let error = WorkflowError::MissingNextState(context.definition_item.id.clone());
            context.abort_with(FailureKind::MissingNextState, error.to_string());
            return Ok(());
        };

        let current_state = context.previous_state_id.clone().unwrap_or_default();
        if next_state == current_state {
            tracing::debug!(
                item = %context.data_item,
                state = %current_state,
                "Command keeps item in its state"
            );
            context.next_state_id = Some(next_state);
            return Ok(());
        }

        self.services
            .items
            .set_workflow_info(
                &context.data_item,
                WorkflowInfo::new(self.workflow_id.as_ref(), next_state.clone()),
            )
            .await?;
        self.services
            .history
            .add_history(
                &context.data_item,
                Some(current_state.as_str()).filter(|s| !s.is_empty()),
                &next_state,
                &context.comment_fields,
                &context.principal,
            )
            .await?;
        self.services
            .items
            .release_edit_lock(&context.data_item, &context.principal)
            .await?;

        log_transition(
            &self.workflow_id,
            &context.data_item,
            Some(current_state.as_str()),
            &next_state,
            &context.principal,
        );
        context.next_state_id = Some(next_state.clone());

        if let Some(state_item) = self.state_item(&next_state).await? {
            context.entry_wait_handle = self
                .run_state_entry(
                    state_item,
                    &context.data_item,
                    &context.principal,
                    &context.session,
                    &context.comment_fields,
                    0,
                )
                .await?;
        }
        Ok(())
    }

    /// Runs the entry actions of a state; returns a resume token if they suspended
    async fn run_state_entry(
        &self,
        state_item: Item,
        item: &ItemRef,
        principal: &Principal,
        session: &str,
        comments: &CommentFields,
        start_at: usize,
    ) -> Result<Option<Uuid>> {
        let actions = self.configured_actions(&state_item).await?;
        if actions.len() <= start_at {
            return Ok(None);
        }

        let state_id = state_item.id.clone();
        let mut context = PipelineContext::new(
            self.workflow_id.as_ref(),
            state_item,
            item.clone(),
            principal.clone(),
            session,
        );
        context.comment_fields = comments.clone();
        context.previous_state_id = Some(state_id.clone());

        match PipelineExecutor::run(&actions, start_at, &mut context).await? {
            PipelineOutcome::Suspended { resume_at } => {
                let key = self
                    .suspend(&context, PendingPipeline::StateEntry { state_id }, resume_at)
                    .await?;
                Ok(Some(key.token))
            }
            PipelineOutcome::Aborted => {
                tracing::warn!(
                    item = %item,
                    state = %state_id,
                    message = context.message.as_deref().unwrap_or(""),
                    "State entry actions aborted"
                );
                Ok(None)
            }
            PipelineOutcome::Completed | PipelineOutcome::Cancelled => Ok(None),
        }
    }

    /// Callback step appended by `start_execute`
    pub(crate) async fn invoke_callback(
        &self,
        key: &ContinuationKey,
        context: &mut PipelineContext,
    ) -> Result<()> {
        let Some(registration) = self.services.resumable.take_callback(key).await? else {
            tracing::debug!(key = %key, "No completion callback registered");
            return Ok(());
        };

        let Some(handler) = self.services.plugins.resolve_handler(&registration.handler) else {
            tracing::warn!(
                key = %key,
                handler = %registration.handler,
                "Completion handler not found"
            );
            return Ok(());
        };

        let result = result_of(context, PipelineOutcome::Completed);
        handler.on_complete(&registration, &result).await
    }

    async fn suspend(
        &self,
        context: &PipelineContext,
        pipeline: PendingPipeline,
        resume_at: usize,
    ) -> Result<ContinuationKey> {
        let key = context
            .resume_key()
            .unwrap_or_else(|| ContinuationKey::generate(context.session.clone()));

        self.services
            .resumable
            .save_pending(PendingExecution {
                key: key.clone(),
                workflow_id: self.workflow_id.to_string(),
                item: context.data_item.clone(),
                principal: context.principal.clone(),
                pipeline,
                comment_fields: context.comment_fields.clone(),
                parameters: context.parameters.clone(),
                next_state_override: context.next_state_override.clone(),
                resume_at,
                callback: context.completion_callback.clone(),
                suspended_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            workflow = %self.workflow_id,
            item = %context.data_item,
            key = %key,
            "Pipeline suspended"
        );
        Ok(key)
    }

    /// Drop a callback registration whose pipeline will never reach the Callback step
    async fn discard_callback(&self, key: Option<&ContinuationKey>) -> Result<()> {
        if let Some(key) = key {
            if self.services.resumable.take_callback(key).await?.is_some() {
                tracing::debug!(key = %key, "Completion callback discarded");
            }
        }
        Ok(())
    }

    async fn run_command(
        &self,
        request: ExecuteRequest,
        callback: Option<CompletionCallback>,
    ) -> EngineResult<WorkflowResult> {
        let Some(info) = self.services.items.get_workflow_info(&request.item).await? else {
            return Ok(command_not_found(&request.command_id));
        };
        if info.workflow_id != *self.workflow_id {
            return Ok(command_not_found(&request.command_id));
        }

        tracing::debug!(
            workflow = %self.workflow_id,
            item = %request.item,
            command = %request.command_id,
            phase = ?ExecutionPhase::Resolving,
            "Resolving command"
        );
        let Some(command) = self
            .commands
            .find_command(&info.state_id, &request.command_id, &request.principal)
            .await?
        else {
            return Ok(command_not_found(&request.command_id));
        };

        let callback = match callback {
            Some(callback) => {
                let key = ContinuationKey::generate(request.session.clone());
                self.services
                    .resumable
                    .register_callback(CallbackRegistration::new(
                        key.clone(),
                        callback.handler,
                        callback.payload,
                    ))
                    .await?;
                Some(key)
            }
            None => None,
        };

        let actions = self.command_pipeline(&command, callback.as_ref()).await?;
        let mut context = PipelineContext::new(
            self.workflow_id.as_ref(),
            command,
            request.item,
            request.principal,
            request.session,
        );
        context.comment_fields = request.comment_fields;
        context.parameters = request.parameters;
        context.previous_state_id = Some(info.state_id.clone());
        context.completion_callback = callback;

        let outcome = PipelineExecutor::run(&actions, 0, &mut context).await?;
        self.finish_command(context, outcome, &info.state_id).await
    }

    async fn finish_command(
        &self,
        context: PipelineContext,
        outcome: PipelineOutcome,
        from_state: &str,
    ) -> EngineResult<WorkflowResult> {
        if let PipelineOutcome::Suspended { resume_at } = outcome {
            let pipeline = PendingPipeline::Command {
                command_id: context.definition_item.id.clone(),
                from_state: from_state.to_string(),
            };
            let key = self.suspend(&context, pipeline, resume_at).await?;
            let mut result = result_of(&context, outcome);
            result.resume_token = Some(key.token);
            return Ok(result);
        }

        if outcome != PipelineOutcome::Completed {
            self.discard_callback(context.completion_callback.as_ref()).await?;
        }
        if outcome == PipelineOutcome::Aborted {
            tracing::warn!(
                workflow = %self.workflow_id,
                item = %context.data_item,
                command = %context.definition_item.id,
                message = context.message.as_deref().unwrap_or(""),
                "Command pipeline aborted"
            );
        }
        Ok(result_of(&context, outcome))
    }
}

fn command_not_found(command_id: &str) -> WorkflowResult {
    WorkflowResult::failed(
        FailureKind::CommandNotFound,
        WorkflowError::CommandNotFound(command_id.to_string()).to_string(),
        ExecutionPhase::NoCommand,
    )
}

fn result_of(context: &PipelineContext, outcome: PipelineOutcome) -> WorkflowResult {
    let message = context.message.clone().unwrap_or_default();
    match outcome {
        PipelineOutcome::Completed => WorkflowResult {
            succeeded: true,
            message,
            next_state_id: context.next_state_id.clone(),
            is_completed: true,
            phase: ExecutionPhase::Completed,
            failure: None,
            resume_token: context.entry_wait_handle,
        },
        PipelineOutcome::Cancelled => WorkflowResult {
            succeeded: true,
            message,
            next_state_id: context.previous_state_id.clone(),
            is_completed: true,
            phase: ExecutionPhase::Completed,
            failure: None,
            resume_token: None,
        },
        PipelineOutcome::Aborted => WorkflowResult {
            succeeded: false,
            message,
            next_state_id: None,
            is_completed: true,
            phase: ExecutionPhase::Aborted,
            failure: Some(context.failure.unwrap_or(FailureKind::Aborted)),
            resume_token: None,
        },
        PipelineOutcome::Suspended { .. } => WorkflowResult {
            succeeded: false,
            message,
            next_state_id: None,
            is_completed: false,
            phase: ExecutionPhase::Suspended,
            failure: None,
            resume_token: context.wait_handle,
        },
    }
}

#[async_trait]
impl WorkflowEngine for Workflow {
    fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    async fn start(&self, item: &ItemRef, principal: &Principal) -> EngineResult<WorkflowResult> {
        self.services.history.clear_history(item).await?;

        let definition = self.definition().await?;
        let initial_state = definition.field(field_ids::INITIAL_STATE).trim().to_string();
        if initial_state.is_empty() {
            return Err(WorkflowError::MissingInitialState(
                self.workflow_id.to_string(),
            ));
        }

        self.services
            .items
            .set_workflow_info(
                item,
                WorkflowInfo::new(self.workflow_id.as_ref(), initial_state.clone()),
            )
            .await?;
        self.services
            .history
            .add_history(
                item,
                None,
                &initial_state,
                &comment_fields(&self.services.item_created_comment),
                principal,
            )
            .await?;
        log_transition(&self.workflow_id, item, None, &initial_state, principal);

        let mut resume_token = None;
        if let Some(state_item) = self.state_item(&initial_state).await? {
            resume_token = self
                .run_state_entry(
                    state_item,
                    item,
                    principal,
                    DEFAULT_SESSION,
                    &CommentFields::new(),
                    0,
                )
                .await?;
        }

        Ok(WorkflowResult {
            succeeded: true,
            message: String::new(),
            next_state_id: Some(initial_state),
            is_completed: true,
            phase: ExecutionPhase::Completed,
            failure: None,
            resume_token,
        })
    }

    async fn execute(&self, request: ExecuteRequest) -> EngineResult<WorkflowResult> {
        self.run_command(request, None).await
    }

    async fn start_execute(
        &self,
        request: ExecuteRequest,
        callback: CompletionCallback,
    ) -> EngineResult<WorkflowResult> {
        self.run_command(request, Some(callback)).await
    }

    async fn resume(&self, key: &ContinuationKey) -> EngineResult<WorkflowResult> {
        let pending = self
            .services
            .resumable
            .take_pending(key)
            .await?
            .ok_or(WorkflowError::ContinuationNotFound(key.token))?;

        if pending.workflow_id != *self.workflow_id {
            tracing::warn!(
                workflow = %self.workflow_id,
                owner = %pending.workflow_id,
                key = %key,
                "Continuation belongs to another workflow"
            );
            self.services.resumable.save_pending(pending).await?;
            return Err(WorkflowError::ContinuationNotFound(key.token));
        }

        tracing::info!(
            workflow = %self.workflow_id,
            item = %pending.item,
            key = %key,
            "Resuming pipeline"
        );

        match pending.pipeline {
            PendingPipeline::Command {
                command_id,
                from_state,
            } => {
                let Some(command) = self.services.items.get_item(&command_id).await? else {
                    self.discard_callback(pending.callback.as_ref()).await?;
                    return Ok(command_not_found(&command_id));
                };

                let actions = self
                    .command_pipeline(&command, pending.callback.as_ref())
                    .await?;
                let mut context = PipelineContext::new(
                    self.workflow_id.as_ref(),
                    command,
                    pending.item,
                    pending.principal,
                    key.session.clone(),
                );
                context.comment_fields = pending.comment_fields;
                context.parameters = pending.parameters;
                context.next_state_override = pending.next_state_override;
                context.previous_state_id = Some(from_state.clone());
                context.completion_callback = pending.callback;

                let outcome =
                    PipelineExecutor::run(&actions, pending.resume_at, &mut context).await?;
                self.finish_command(context, outcome, &from_state).await
            }
            PendingPipeline::StateEntry { state_id } => {
                let Some(state_item) = self.state_item(&state_id).await? else {
                    return Err(WorkflowError::ItemNotFound(state_id));
                };
                let resume_token = self
                    .run_state_entry(
                        state_item,
                        &pending.item,
                        &pending.principal,
                        &key.session,
                        &pending.comment_fields,
                        pending.resume_at,
                    )
                    .await?;

                Ok(WorkflowResult {
                    succeeded: true,
                    message: String::new(),
                    next_state_id: Some(state_id),
                    is_completed: true,
                    phase: ExecutionPhase::Completed,
                    failure: None,
                    resume_token,
                })
            }
        }
    }

    async fn get_state(&self, item: &ItemRef) -> EngineResult<Option<WorkflowState>> {
        let Some(info) = self.services.items.get_workflow_info(item).await? else {
            return Ok(None);
        };
        self.get_state_by_id(&info.state_id).await
    }

    async fn get_state_by_id(&self, state_id: &str) -> EngineResult<Option<WorkflowState>> {
        Ok(self
            .state_item(state_id)
            .await?
            .map(|item| WorkflowState::from_definition(&item)))
    }

    async fn get_states(&self) -> EngineResult<Vec<WorkflowState>> {
        let mut states = Vec::new();
        for child in self.services.items.get_children(&self.workflow_id).await? {
            if self
                .services
                .items
                .descends_from(&child, template_ids::WORKFLOW_STATE)
                .await?
            {
                states.push(WorkflowState::from_definition(&child));
            }
        }
        Ok(states)
    }

    async fn get_initial_state(&self) -> EngineResult<Option<WorkflowState>> {
        let definition = self.definition().await?;
        self.get_state_by_id(definition.field(field_ids::INITIAL_STATE).trim())
            .await
    }

    async fn get_commands(
        &self,
        item: &ItemRef,
        principal: &Principal,
    ) -> EngineResult<Vec<WorkflowCommand>> {
        let Some(info) = self.services.items.get_workflow_info(item).await? else {
            return Ok(Vec::new());
        };
        self.get_commands_for_state(&info.state_id, item, principal)
            .await
    }

    async fn get_commands_for_state(
        &self,
        state_id: &str,
        item: &ItemRef,
        principal: &Principal,
    ) -> EngineResult<Vec<WorkflowCommand>> {
        if state_id.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.commands.list_commands(state_id, item, principal).await?)
    }

    async fn get_history(&self, item: &ItemRef) -> EngineResult<Vec<HistoryEntry>> {
        Ok(self.services.history.get_history(item).await?)
    }

    async fn is_approved(&self, item: &ItemRef, target: Option<&str>) -> EngineResult<bool> {
        if self.services.items.get_workflow_info(item).await?.is_none() {
            return Ok(true);
        }
        let Some(state) = self.get_state(item).await? else {
            return Ok(false);
        };
        if state.is_final {
            return Ok(true);
        }
        Ok(target.is_some_and(|target| state.has_preview_target(target)))
    }

    async fn get_items(&self, state_id: &str) -> EngineResult<Vec<ItemRef>> {
        Ok(self
            .services
            .items
            .get_items_in_state(&self.workflow_id, state_id)
            .await?)
    }

    async fn get_item_count(&self, state_id: &str) -> EngineResult<usize> {
        Ok(self.get_items(state_id).await?.len())
    }
}
