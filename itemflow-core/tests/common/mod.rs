//! Shared fixtures: an editorial workflow (Draft → Review → Published)

#![allow(dead_code)]

use itemflow_core::models::{field_ids, template_ids, ItemRef, Principal};
use itemflow_core::workflow::{
    ExecuteRequest, ItemRecord, JsonRepository, PluginRegistry, RepositoryDocument,
    WorkflowEngine, WorkflowProvider, AWAIT_APPROVAL, REQUIRE_COMMENT, ROUTE_TO_STATE,
    STAY_IN_PLACE,
};
use std::sync::Arc;

pub const WORKFLOW: &str = "editorial";
pub const ARTICLE: &str = "article";

pub fn state(id: &str, display_name: &str) -> ItemRecord {
    ItemRecord::new(id, template_ids::WORKFLOW_STATE)
        .with_parent(WORKFLOW)
        .with_display_name(display_name)
}

pub fn command(id: &str, state_id: &str, next_state: &str) -> ItemRecord {
    ItemRecord::new(id, template_ids::WORKFLOW_COMMAND)
        .with_parent(state_id)
        .with_field(field_ids::NEXT_STATE, next_state)
}

pub fn action(id: &str, parent: &str, action_type: &str) -> ItemRecord {
    ItemRecord::new(id, template_ids::WORKFLOW_ACTION)
        .with_parent(parent)
        .with_field(field_ids::ACTION_TYPE, action_type)
}

/// Editorial workflow plus one two-version article
pub fn editorial_document() -> RepositoryDocument {
    RepositoryDocument::new()
        .with_template("page", &[])
        .with_template("approval-command", &[template_ids::WORKFLOW_COMMAND])
        .with_item(
            ItemRecord::new(WORKFLOW, template_ids::WORKFLOW)
                .with_display_name("Editorial")
                .with_field(field_ids::INITIAL_STATE, "draft"),
        )
        .with_item(state("draft", "Draft"))
        .with_item(
            state("review", "Review")
                .with_field(field_ids::PREVIEW_PUBLISHING_TARGETS, "staging|Preview"),
        )
        .with_item(state("published", "Published").with_field(field_ids::FINAL, "1"))
        .with_item(command("submit", "draft", "review").with_display_name("Submit"))
        .with_item(command("save", "draft", "draft").with_display_name("Save"))
        .with_item(command("hold", "draft", "review").with_display_name("Hold"))
        .with_item(action("hold-stay", "hold", STAY_IN_PLACE))
        .with_item(command("fast-track", "draft", "review"))
        .with_item(
            action("fast-track-route", "fast-track", ROUTE_TO_STATE)
                .with_field(field_ids::NEXT_STATE, "published"),
        )
        .with_item({
            let mut approve = command("approve", "review", "published");
            approve.template = "approval-command".to_string();
            approve
        })
        .with_item(action("approve-comment", "approve", REQUIRE_COMMENT))
        .with_item(command("reject", "review", "draft"))
        .with_item(ItemRecord::new("escalate", template_ids::WORKFLOW_COMMAND).with_parent("review"))
        .with_item(command("legal", "review", "published"))
        .with_item(action("legal-wait", "legal", AWAIT_APPROVAL).with_display_name("Legal"))
        .with_item(ItemRecord::new("broken", template_ids::WORKFLOW))
        .with_item(ItemRecord::new(ARTICLE, "page").with_versions(vec![1, 2]))
}

pub fn provider_for(document: RepositoryDocument, registry: PluginRegistry) -> (Arc<JsonRepository>, WorkflowProvider) {
    let repository = Arc::new(JsonRepository::in_memory(document));
    let provider = WorkflowProvider::new(repository.services(Arc::new(registry)));
    (repository, provider)
}

pub async fn editorial_workflow(document: RepositoryDocument) -> (Arc<JsonRepository>, Arc<dyn WorkflowEngine>) {
    let (repository, provider) = provider_for(document, PluginRegistry::with_builtins());
    let workflow = provider
        .get_workflow(WORKFLOW)
        .await
        .unwrap()
        .expect("editorial workflow is defined");
    (repository, workflow)
}

pub fn article(version: u32) -> ItemRef {
    ItemRef::new(ARTICLE, version)
}

pub fn editor() -> Principal {
    Principal::new("editor")
}

pub fn request(command_id: &str, item: &ItemRef) -> ExecuteRequest {
    ExecuteRequest::new(command_id, item.clone(), editor())
}

/// Start the item and move it to `published`
pub async fn publish(workflow: &Arc<dyn WorkflowEngine>, item: &ItemRef) {
    workflow.start(item, &editor()).await.unwrap();
    workflow.execute(request("submit", item)).await.unwrap();
    let result = workflow
        .execute(request("approve", item).with_comments("Looks good"))
        .await
        .unwrap();
    assert_eq!(result.next_state_id.as_deref(), Some("published"));
}
