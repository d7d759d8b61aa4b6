//! Typed plugin registry
//!
//! Plugins are registered under a string identifier at startup and resolved
//! by the identifier stored in definition items. Resolution never fails hard:
//! an unknown identifier yields `None` and the caller decides how to degrade.

use crate::models::{Item, ItemRef, WorkflowResult};
use crate::workflow::pipeline::PipelineContext;
use crate::workflow::resumable::CallbackRegistration;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Overrides how a command is presented for a given item
pub trait AppearanceEvaluator: Send + Sync {
    fn command_name(&self, item: &ItemRef, command: &Item) -> String;
    fn command_icon(&self, item: &ItemRef, command: &Item) -> String;
    fn has_ui(&self, item: &ItemRef, command: &Item) -> bool;
    fn suppress_comments(&self, item: &ItemRef, command: &Item) -> bool;
}

/// One configured step of a command or state-entry pipeline
#[async_trait]
pub trait WorkflowAction: Send + Sync {
    /// Run the step against the shared context
    ///
    /// Expected failures are reported by setting `aborted` and `message` on the
    /// context. An `Err` is reserved for collaborator faults.
    async fn process(&self, definition: &Item, context: &mut PipelineContext) -> Result<()>;
}

/// Receives the outcome of a `start_execute` call, possibly much later
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn on_complete(&self, registration: &CallbackRegistration, result: &WorkflowResult) -> Result<()>;
}

/// Resolves plugin identifiers to instances
pub trait PluginLoader: Send + Sync {
    fn resolve_evaluator(&self, type_name: &str) -> Option<Arc<dyn AppearanceEvaluator>>;
    fn resolve_action(&self, type_name: &str) -> Option<Arc<dyn WorkflowAction>>;
    fn resolve_handler(&self, name: &str) -> Option<Arc<dyn CompletionHandler>>;
}

type Factory<T> = Arc<dyn Fn() -> Arc<T> + Send + Sync>;

/// In-process registry populated at startup
#[derive(Clone, Default)]
pub struct PluginRegistry {
    evaluators: Arc<DashMap<String, Factory<dyn AppearanceEvaluator>>>,
    actions: Arc<DashMap<String, Factory<dyn WorkflowAction>>>,
    handlers: Arc<DashMap<String, Factory<dyn CompletionHandler>>>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in actions registered
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        crate::workflow::actions::register_builtin_actions(&registry);
        registry
    }

    pub fn register_evaluator<F>(&self, type_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn AppearanceEvaluator> + Send + Sync + 'static,
    {
        self.evaluators.insert(type_name.into(), Arc::new(factory));
    }

    pub fn register_action<F>(&self, type_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn WorkflowAction> + Send + Sync + 'static,
    {
        self.actions.insert(type_name.into(), Arc::new(factory));
    }

    pub fn register_handler<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn CompletionHandler> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(factory));
    }

    /// Registered action identifiers, sorted
    pub fn action_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl PluginLoader for PluginRegistry {
    fn resolve_evaluator(&self, type_name: &str) -> Option<Arc<dyn AppearanceEvaluator>> {
        self.evaluators.get(type_name.trim()).map(|entry| (entry.value())())
    }

    fn resolve_action(&self, type_name: &str) -> Option<Arc<dyn WorkflowAction>> {
        self.actions.get(type_name.trim()).map(|entry| (entry.value())())
    }

    fn resolve_handler(&self, name: &str) -> Option<Arc<dyn CompletionHandler>> {
        self.handlers.get(name.trim()).map(|entry| (entry.value())())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::template_ids;
    use std::collections::HashMap;

    struct Shouting;

    impl AppearanceEvaluator for Shouting {
        fn command_name(&self, _item: &ItemRef, command: &Item) -> String {
            command.display_name().to_uppercase()
        }
        fn command_icon(&self, _item: &ItemRef, _command: &Item) -> String {
            "icons/loud.png".to_string()
        }
        fn has_ui(&self, _item: &ItemRef, _command: &Item) -> bool {
            true
        }
        fn suppress_comments(&self, _item: &ItemRef, _command: &Item) -> bool {
            false
        }
    }

    #[test]
    fn test_resolve_registered_evaluator() {
        let registry = PluginRegistry::new();
        registry.register_evaluator("shouting", || Arc::new(Shouting));

        let command = Item {
            id: "submit".to_string(),
            name: "Submit".to_string(),
            display_name: None,
            icon: None,
            template: template_ids::WORKFLOW_COMMAND.to_string(),
            parent: None,
            fields: HashMap::new(),
        };
        let evaluator = registry.resolve_evaluator(" shouting ").unwrap();
        assert_eq!(evaluator.command_name(&ItemRef::new("a", 1), &command), "SUBMIT");
    }

    #[test]
    fn test_unknown_identifiers_resolve_to_none() {
        let registry = PluginRegistry::new();
        assert!(registry.resolve_evaluator("missing").is_none());
        assert!(registry.resolve_action("missing").is_none());
        assert!(registry.resolve_handler("missing").is_none());
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = PluginRegistry::with_builtins();
        let types = registry.action_types();
        assert!(types.contains(&"require-comment".to_string()));
        assert!(types.contains(&"await-approval".to_string()));
        assert!(registry.resolve_action("stay-in-place").is_some());
    }
}
