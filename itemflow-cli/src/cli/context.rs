//! Host context: configuration, identity and the workflow provider

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::Args;
use itemflow_core::models::{Configuration, ItemRef, Principal, WorkflowResult};
use itemflow_core::services::init_logging;
use itemflow_core::workflow::{
    CallbackRegistration, CompletionHandler, JsonRepository, PluginRegistry, WorkflowEngine,
    WorkflowProvider,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Name of the completion handler the CLI registers
pub const LOG_HANDLER: &str = "log";

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository document (overrides the configuration)
    #[arg(long, global = true)]
    pub repository: Option<PathBuf>,

    /// User the operation is performed for
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Session for resumable operations
    #[arg(long, global = true)]
    pub session: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,
}

/// Writes completed `execute --callback log` runs to the audit log
struct LogCompletion;

#[async_trait]
impl CompletionHandler for LogCompletion {
    async fn on_complete(&self, registration: &CallbackRegistration, result: &WorkflowResult) -> Result<()> {
        tracing::info!(
            target: "itemflow::audit",
            key = %registration.key,
            payload = %registration.payload,
            succeeded = result.succeeded,
            next_state = result.next_state_id.as_deref().unwrap_or(""),
            "Command completed"
        );
        Ok(())
    }
}

/// Everything a handler needs to talk to the repository
pub struct HostContext {
    pub config: Configuration,
    pub principal: Principal,
    pub session: String,
    pub repository: Arc<JsonRepository>,
    pub provider: WorkflowProvider,
}

impl HostContext {
    /// Load configuration, apply command-line overrides and open the repository
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let config_path = match &args.config {
            Some(path) => path.clone(),
            None => Configuration::default_config_path()
                .unwrap_or_else(|_| PathBuf::from("config.toml")),
        };
        let mut config = Configuration::load_from_file(&config_path)
            .map_err(|e| anyhow!("Failed to load {}: {}", config_path.display(), e))?;

        if let Some(repository) = &args.repository {
            config.repository_path = repository.clone();
        }
        if let Some(user) = &args.user {
            config.default_user = user.clone();
        }
        if let Some(session) = &args.session {
            config.session = session.clone();
        }
        config
            .validate()
            .map_err(|errors| anyhow!("Invalid configuration: {}", errors.join("; ")))?;

        if let Err(e) = init_logging(config.log_level) {
            tracing::debug!(error = %e, "Logging already initialized");
        }

        let repository = Arc::new(
            JsonRepository::open(&config.repository_path)
                .context("Failed to open repository")?,
        );

        let registry = PluginRegistry::with_builtins();
        registry.register_handler(LOG_HANDLER, || Arc::new(LogCompletion));

        let services = repository
            .services(Arc::new(registry))
            .with_item_created_comment(config.item_created_comment.clone());

        Ok(Self {
            principal: Principal::new(config.default_user.clone()),
            session: config.session.clone(),
            provider: WorkflowProvider::new(services),
            repository,
            config,
        })
    }

    /// Engine for a workflow id, failing with a hint when it doesn't exist
    pub async fn workflow(&self, workflow_id: &str) -> Result<Arc<dyn WorkflowEngine>> {
        self.provider.get_workflow(workflow_id).await?.ok_or_else(|| {
            anyhow!(
                "Workflow '{}' not found. Use 'itemflow workflows' to see available workflows.",
                workflow_id
            )
        })
    }

    /// Engine the item is currently bound to
    pub async fn workflow_for_item(&self, item: &ItemRef) -> Result<Arc<dyn WorkflowEngine>> {
        self.provider
            .get_workflow_for_item(item)
            .await?
            .ok_or_else(|| anyhow!("Item '{}' is not in a workflow", item))
    }
}
