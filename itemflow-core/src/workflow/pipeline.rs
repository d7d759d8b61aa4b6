//! Action pipeline execution
//!
//! A pipeline is an ordered list of [`Action`]s run strictly in sequence
//! against one [`PipelineContext`]. The executor stops before the next action
//! once the context is aborted, has its transition cancelled or is suspended.
//! A running action is never interrupted.

use crate::models::{CommentFields, ExecutionPhase, FailureKind, Item, ItemRef, Principal};
use crate::workflow::engine::Workflow;
use crate::workflow::plugins::WorkflowAction;
use crate::workflow::resumable::ContinuationKey;
use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Mutable state shared by the actions of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Workflow the run belongs to
    pub workflow_id: String,
    /// Command definition, or the state definition for state-entry runs
    pub definition_item: Item,
    /// Item version being moved through the workflow
    pub data_item: ItemRef,
    /// Actor the run is performed for
    pub principal: Principal,
    /// Session discriminator for resumable operations
    pub session: String,
    pub comment_fields: CommentFields,
    /// Free-form values actions pass to each other
    pub parameters: HashMap<String, String>,
    pub aborted: bool,
    pub cancel_transition: bool,
    pub suspended: bool,
    /// Next state chosen by an action, wins over the command definition
    pub next_state_override: Option<String>,
    pub message: Option<String>,
    /// Token a suspended run can be resumed with
    pub wait_handle: Option<Uuid>,
    /// Registered completion callback, if any
    pub completion_callback: Option<ContinuationKey>,
    pub phase: ExecutionPhase,
    /// State the item was in when the command was resolved
    pub previous_state_id: Option<String>,
    /// State the item is in after the transition action ran
    pub next_state_id: Option<String>,
    pub failure: Option<FailureKind>,
    /// Set when a state-entry run after the transition suspended
    pub entry_wait_handle: Option<Uuid>,
}

impl PipelineContext {
    pub fn new(
        workflow_id: impl Into<String>,
        definition_item: Item,
        data_item: ItemRef,
        principal: Principal,
        session: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            definition_item,
            data_item,
            principal,
            session: session.into(),
            comment_fields: CommentFields::new(),
            parameters: HashMap::new(),
            aborted: false,
            cancel_transition: false,
            suspended: false,
            next_state_override: None,
            message: None,
            wait_handle: None,
            completion_callback: None,
            phase: ExecutionPhase::Executing,
            previous_state_id: None,
            next_state_id: None,
            failure: None,
            entry_wait_handle: None,
        }
    }

    /// Mark the run as failed
    pub fn abort(&mut self, message: impl Into<String>) {
        self.aborted = true;
        self.message = Some(message.into());
    }

    /// Mark the run as failed with a classified reason
    pub fn abort_with(&mut self, failure: FailureKind, message: impl Into<String>) {
        self.failure = Some(failure);
        self.abort(message);
    }

    /// Pause the run until it is resumed with the returned token
    pub fn suspend(&mut self) -> Uuid {
        let token = Uuid::new_v4();
        self.suspended = true;
        self.wait_handle = Some(token);
        token
    }

    /// Whether no further action may run
    pub fn is_halted(&self) -> bool {
        self.aborted || self.cancel_transition || self.suspended
    }

    /// Key a suspended run is stored under
    pub fn resume_key(&self) -> Option<ContinuationKey> {
        self.wait_handle
            .map(|token| ContinuationKey::new(token, self.session.clone()))
    }

    /// Whether every comment value is blank
    pub fn has_blank_comments(&self) -> bool {
        self.comment_fields.values().all(|v| v.trim().is_empty())
    }
}

/// One step of a pipeline
#[derive(Clone)]
pub enum Action {
    /// Configured action resolved from an action definition item
    Plugin {
        definition: Item,
        action: Arc<dyn WorkflowAction>,
    },
    /// Engine-appended step that moves the item to its next state
    Transition(Workflow),
    /// Engine-appended step that invokes the caller's completion callback
    Callback {
        workflow: Workflow,
        key: ContinuationKey,
    },
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

impl Action {
    // Boxed: the transition step runs state-entry pipelines through the executor again
    fn process<'a>(&'a self, context: &'a mut PipelineContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match self {
                Action::Plugin { definition, action } => action.process(definition, context).await,
                Action::Transition(workflow) => workflow.complete_transition(context).await,
                Action::Callback { workflow, key } => workflow.invoke_callback(key, context).await,
            }
        })
    }

    fn label(&self) -> &str {
        match self {
            Action::Plugin { definition, .. } => &definition.name,
            Action::Transition(_) => "transition",
            Action::Callback { .. } => "callback",
        }
    }
}

/// How a pipeline run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every action ran
    Completed,
    /// An action aborted the run
    Aborted,
    /// An action asked to keep the item in place
    Cancelled,
    /// An action is waiting for external input; resume at `resume_at`
    Suspended { resume_at: usize },
}

/// Runs pipelines
pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Run `actions[start_at..]` in order
    pub async fn run(
        actions: &[Action],
        start_at: usize,
        context: &mut PipelineContext,
    ) -> Result<PipelineOutcome> {
        context.phase = ExecutionPhase::Executing;

        for (index, action) in actions.iter().enumerate().skip(start_at) {
            if context.is_halted() {
                break;
            }

            tracing::debug!(
                workflow = %context.workflow_id,
                item = %context.data_item,
                step = index,
                action = action.label(),
                "Running pipeline action"
            );

            action.process(context).await?;

            if context.suspended {
                context.phase = ExecutionPhase::Suspended;
                return Ok(PipelineOutcome::Suspended {
                    resume_at: index + 1,
                });
            }
        }

        let outcome = Self::outcome_of(context);
        context.phase = match outcome {
            PipelineOutcome::Aborted => ExecutionPhase::Aborted,
            _ => ExecutionPhase::Completed,
        };
        Ok(outcome)
    }

    fn outcome_of(context: &PipelineContext) -> PipelineOutcome {
        if context.aborted {
            PipelineOutcome::Aborted
        } else if context.cancel_transition {
            PipelineOutcome::Cancelled
        } else {
            PipelineOutcome::Completed
        }
    }
}
