//! Itemflow command handlers

use super::context::HostContext;
use anyhow::{anyhow, Context, Result};
use itemflow_core::models::{AccessRight, ItemRef, WorkflowResult};
use itemflow_core::workflow::{
    CompletionCallback, ContinuationKey, ExecuteRequest, ResumableStore,
};
use std::collections::HashMap;

/// Optional arguments of `execute`
#[derive(Debug, Default)]
pub struct ExecuteOptions {
    pub comment: Option<String>,
    /// `name=value` pairs
    pub params: Vec<String>,
    pub callback: Option<String>,
    pub payload: Option<String>,
}

/// Parse `name=value` pipeline parameters
pub fn parse_params(params: &[String]) -> Result<HashMap<String, String>> {
    let mut parsed = HashMap::new();
    for param in params {
        let (name, value) = param
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid parameter '{}' (expected name=value)", param))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("Invalid parameter '{}' (empty name)", param));
        }
        parsed.insert(name.to_string(), value.to_string());
    }
    Ok(parsed)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_result(result: &WorkflowResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }

    if !result.is_completed {
        println!("⏸  Pipeline suspended");
    } else if result.succeeded {
        println!("✅ Completed");
    } else {
        println!("❌ Failed");
    }
    if let Some(state) = &result.next_state_id {
        println!("   State:   {}", state);
    }
    if !result.message.is_empty() {
        println!("   Message: {}", result.message);
    }
    if let Some(failure) = result.failure {
        println!("   Reason:  {:?}", failure);
    }
    if let Some(token) = result.resume_token {
        println!();
        println!("Use 'itemflow resume {}' to continue", token);
    }
    Ok(())
}

/// Handle workflows command
pub async fn handle_workflows(host: &HostContext, json: bool) -> Result<()> {
    let mut listing = Vec::new();
    for workflow in host.provider.get_workflows().await? {
        let initial = workflow.get_initial_state().await?;
        let states = workflow.get_states().await?;
        listing.push((workflow.workflow_id().to_string(), initial, states.len()));
    }

    if json {
        let output: Vec<_> = listing
            .iter()
            .map(|(id, initial, states)| {
                serde_json::json!({
                    "workflow_id": id,
                    "initial_state": initial.as_ref().map(|s| s.state_id.clone()),
                    "states": states,
                })
            })
            .collect();
        return print_json(&output);
    }

    if listing.is_empty() {
        println!("No workflows defined in {}", host.config.repository_path.display());
        return Ok(());
    }
    println!("Available Workflows");
    println!("===================");
    for (id, initial, states) in listing {
        let initial = initial
            .map(|s| s.display_name)
            .unwrap_or_else(|| "(none)".to_string());
        println!("{:<24} initial: {:<16} states: {}", id, initial, states);
    }
    Ok(())
}

/// Handle states command
pub async fn handle_states(host: &HostContext, workflow_id: &str, json: bool) -> Result<()> {
    let workflow = host.workflow(workflow_id).await?;
    let states = workflow.get_states().await?;

    if json {
        return print_json(&states);
    }

    println!("States of '{}'", workflow_id);
    for state in states {
        let count = workflow.get_item_count(&state.state_id).await?;
        let marker = if state.is_final { " (final)" } else { "" };
        println!(
            "  {:<16} {}{}  [{} item(s)]",
            state.state_id, state.display_name, marker, count
        );
    }
    Ok(())
}

/// Handle start command
pub async fn handle_start(
    host: &HostContext,
    workflow_id: &str,
    item_id: &str,
    version: u32,
    json: bool,
) -> Result<()> {
    let workflow = host.workflow(workflow_id).await?;
    let item = ItemRef::new(item_id, version);

    let result = workflow
        .start(&item, &host.principal)
        .await
        .with_context(|| format!("Failed to start {} in '{}'", item, workflow_id))?;
    print_result(&result, json)
}

/// Handle state command
pub async fn handle_state(host: &HostContext, item_id: &str, version: u32, json: bool) -> Result<()> {
    let item = ItemRef::new(item_id, version);
    let Some(workflow) = host.provider.get_workflow_for_item(&item).await? else {
        if json {
            return print_json(&serde_json::Value::Null);
        }
        println!("{} is not in a workflow", item);
        return Ok(());
    };

    let state = workflow.get_state(&item).await?;
    if json {
        return print_json(&serde_json::json!({
            "workflow_id": workflow.workflow_id(),
            "state": state,
        }));
    }

    match state {
        Some(state) => {
            println!("Item:     {}", item);
            println!("Workflow: {}", workflow.workflow_id());
            println!("State:    {} ({})", state.display_name, state.state_id);
            if state.is_final {
                println!("Final:    yes");
            }
            if !state.preview_targets.is_empty() {
                println!("Preview:  {}", state.preview_targets.join(", "));
            }
        }
        None => println!("{} references a state that no longer exists", item),
    }
    Ok(())
}

/// Handle commands command
pub async fn handle_commands(host: &HostContext, item_id: &str, version: u32, json: bool) -> Result<()> {
    let item = ItemRef::new(item_id, version);
    let workflow = host.workflow_for_item(&item).await?;
    let commands = workflow.get_commands(&item, &host.principal).await?;

    if json {
        return print_json(&commands);
    }

    if commands.is_empty() {
        println!("No commands available to {}", host.principal);
        return Ok(());
    }
    for command in commands {
        let mut flags = Vec::new();
        if command.has_ui {
            flags.push("ui");
        }
        if command.suppress_comment {
            flags.push("no comment");
        }
        println!(
            "  {:<16} {}{}",
            command.command_id,
            command.display_name,
            if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            }
        );
    }
    Ok(())
}

/// Handle execute command
pub async fn handle_execute(
    host: &HostContext,
    item_id: &str,
    version: u32,
    command_id: &str,
    options: ExecuteOptions,
    json: bool,
) -> Result<()> {
    let item = ItemRef::new(item_id, version);
    let workflow = host.workflow_for_item(&item).await?;

    let mut request = ExecuteRequest::new(command_id, item, host.principal.clone())
        .in_session(host.session.clone());
    if let Some(comment) = &options.comment {
        request = request.with_comments(comment);
    }
    for (name, value) in parse_params(&options.params)? {
        request = request.with_parameter(name, value);
    }

    let result = match options.callback {
        Some(handler) => {
            let payload = match &options.payload {
                Some(raw) => serde_json::from_str(raw).context("Invalid callback payload JSON")?,
                None => serde_json::Value::Null,
            };
            workflow
                .start_execute(request, CompletionCallback::new(handler, payload))
                .await?
        }
        None => workflow.execute(request).await?,
    };
    print_result(&result, json)
}

/// Handle resume command
pub async fn handle_resume(host: &HostContext, token: &str, json: bool) -> Result<()> {
    let token = uuid::Uuid::parse_str(token).context("Invalid resume token (expected UUID)")?;
    let key = ContinuationKey::new(token, host.session.clone());

    let pending = host
        .repository
        .list_pending(&host.session)
        .await?
        .into_iter()
        .find(|p| p.key == key)
        .ok_or_else(|| anyhow!("No suspended pipeline for {} in session '{}'", token, host.session))?;

    let workflow = host.workflow(&pending.workflow_id).await?;
    let result = workflow.resume(&key).await?;
    print_result(&result, json)
}

/// Handle pending command
pub async fn handle_pending(host: &HostContext, json: bool) -> Result<()> {
    let pending = host.repository.list_pending(&host.session).await?;

    if json {
        return print_json(&pending);
    }

    if pending.is_empty() {
        println!("No suspended pipelines in session '{}'", host.session);
        return Ok(());
    }
    for p in pending {
        println!(
            "{}  {:<12} {:<12} {}",
            p.key.token,
            p.workflow_id,
            p.item,
            p.suspended_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Handle history command
pub async fn handle_history(host: &HostContext, item_id: &str, version: u32, json: bool) -> Result<()> {
    let item = ItemRef::new(item_id, version);
    let workflow = host.workflow_for_item(&item).await?;
    let history = workflow.get_history(&item).await?;

    if json {
        return print_json(&history);
    }

    println!("Workflow History for {}", item);
    println!("========================");
    for entry in history {
        let comment = entry
            .comment_fields
            .values()
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" | ");
        println!(
            "{}  {:<12} → {:<12} {:<12} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.old_state_id.as_deref().unwrap_or("-"),
            entry.new_state_id,
            entry.user,
            comment
        );
    }
    Ok(())
}

/// Handle approved command
pub async fn handle_approved(
    host: &HostContext,
    item_id: &str,
    version: u32,
    target: Option<&str>,
    json: bool,
) -> Result<()> {
    let item = ItemRef::new(item_id, version);
    // Items outside any workflow are approved
    let approved = match host.provider.get_workflow_for_item(&item).await? {
        Some(workflow) => workflow.is_approved(&item, target).await?,
        None => true,
    };

    if json {
        return print_json(&serde_json::json!({
            "item": item,
            "target": target,
            "approved": approved,
        }));
    }
    println!("{}", if approved { "approved" } else { "not approved" });
    Ok(())
}

/// Handle access command
pub async fn handle_access(
    host: &HostContext,
    item_id: &str,
    version: u32,
    right: &str,
    json: bool,
) -> Result<()> {
    let item = ItemRef::new(item_id, version);
    let right = AccessRight::parse(right);
    let decision = host
        .provider
        .access_resolver()
        .resolve(&item, &host.principal, &right)
        .await?;

    if json {
        return print_json(&decision);
    }
    println!(
        "{}: {}",
        if decision.is_allowed() { "allow" } else { "deny" },
        decision.explanation
    );
    Ok(())
}

/// Handle items command
pub async fn handle_items(host: &HostContext, workflow_id: &str, state_id: &str, json: bool) -> Result<()> {
    let workflow = host.workflow(workflow_id).await?;
    let items = workflow.get_items(state_id).await?;

    if json {
        return print_json(&items);
    }
    println!("{} item(s) in '{}'", items.len(), state_id);
    for item in items {
        println!("  {}", item);
    }
    Ok(())
}

/// Handle end-session command
pub async fn handle_end_session(host: &HostContext, json: bool) -> Result<()> {
    let removed = host.repository.end_session(&host.session).await?;

    if json {
        return print_json(&serde_json::json!({
            "session": host.session,
            "removed": removed,
        }));
    }
    println!("Session '{}' ended, {} registration(s) removed", host.session, removed);
    Ok(())
}
