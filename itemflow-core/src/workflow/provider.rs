//! Workflow provider: maps workflow ids and items to engines

use crate::models::{template_ids, ItemRef};
use crate::workflow::access::AccessResolver;
use crate::workflow::engine::{Workflow, WorkflowEngine, WorkflowServices};
use crate::workflow::error::EngineResult;
use std::sync::Arc;

/// Builds the engine bound to a workflow definition
///
/// Hosts substitute engine variants by supplying their own factory.
pub trait WorkflowFactory: Send + Sync {
    fn instantiate(&self, workflow_id: &str, services: &WorkflowServices) -> Arc<dyn WorkflowEngine>;
}

/// Builds the default [`Workflow`] engine
pub struct DefaultWorkflowFactory;

impl WorkflowFactory for DefaultWorkflowFactory {
    fn instantiate(&self, workflow_id: &str, services: &WorkflowServices) -> Arc<dyn WorkflowEngine> {
        Arc::new(Workflow::new(workflow_id, services.clone()))
    }
}

/// Registry of the workflows defined in one repository
pub struct WorkflowProvider {
    services: WorkflowServices,
    factory: Arc<dyn WorkflowFactory>,
}

impl WorkflowProvider {
    /// Create provider using the default engine
    pub fn new(services: WorkflowServices) -> Self {
        Self::with_factory(services, Arc::new(DefaultWorkflowFactory))
    }

    /// Create provider with a custom engine factory
    pub fn with_factory(services: WorkflowServices, factory: Arc<dyn WorkflowFactory>) -> Self {
        Self { services, factory }
    }

    pub fn services(&self) -> &WorkflowServices {
        &self.services
    }

    /// Access resolver over the same collaborators
    pub fn access_resolver(&self) -> AccessResolver {
        AccessResolver::new(self.services.items.clone(), self.services.oracle.clone())
    }

    /// Engine for a workflow id, if a workflow definition with that id exists
    pub async fn get_workflow(&self, workflow_id: &str) -> EngineResult<Option<Arc<dyn WorkflowEngine>>> {
        if workflow_id.is_empty() {
            return Ok(None);
        }
        let Some(definition) = self.services.items.get_item(workflow_id).await? else {
            return Ok(None);
        };
        if !self
            .services
            .items
            .descends_from(&definition, template_ids::WORKFLOW)
            .await?
        {
            return Ok(None);
        }
        Ok(Some(self.factory.instantiate(workflow_id, &self.services)))
    }

    /// Engine the item is bound to through its persisted workflow info
    pub async fn get_workflow_for_item(
        &self,
        item: &ItemRef,
    ) -> EngineResult<Option<Arc<dyn WorkflowEngine>>> {
        match self.services.items.get_workflow_info(item).await? {
            Some(info) => self.get_workflow(&info.workflow_id).await,
            None => Ok(None),
        }
    }

    /// Engines for every workflow defined in the repository
    pub async fn get_workflows(&self) -> EngineResult<Vec<Arc<dyn WorkflowEngine>>> {
        let mut workflows = Vec::new();
        for workflow_id in self.services.items.get_workflow_ids().await? {
            workflows.push(self.factory.instantiate(&workflow_id, &self.services));
        }
        Ok(workflows)
    }
}
