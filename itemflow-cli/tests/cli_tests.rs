//! End-to-end tests of the itemflow binary against a temporary repository

use itemflow_core::models::{field_ids, template_ids};
use itemflow_core::workflow::{ItemRecord, RepositoryDocument, AWAIT_APPROVAL};
use std::path::Path;
use std::process::Command;
use tempfile::{tempdir, TempDir};

fn seed_repository(dir: &Path) -> std::path::PathBuf {
    let document = RepositoryDocument::new()
        .with_item(
            ItemRecord::new("editorial", template_ids::WORKFLOW)
                .with_field(field_ids::INITIAL_STATE, "draft"),
        )
        .with_item(ItemRecord::new("draft", template_ids::WORKFLOW_STATE).with_parent("editorial"))
        .with_item(ItemRecord::new("review", template_ids::WORKFLOW_STATE).with_parent("editorial"))
        .with_item(
            ItemRecord::new("published", template_ids::WORKFLOW_STATE)
                .with_parent("editorial")
                .with_field(field_ids::FINAL, "1"),
        )
        .with_item(
            ItemRecord::new("submit", template_ids::WORKFLOW_COMMAND)
                .with_parent("draft")
                .with_field(field_ids::NEXT_STATE, "review"),
        )
        .with_item(
            ItemRecord::new("legal", template_ids::WORKFLOW_COMMAND)
                .with_parent("review")
                .with_field(field_ids::NEXT_STATE, "published"),
        )
        .with_item(
            ItemRecord::new("legal-wait", template_ids::WORKFLOW_ACTION)
                .with_parent("legal")
                .with_field(field_ids::ACTION_TYPE, AWAIT_APPROVAL),
        )
        .with_item(ItemRecord::new("article", "page"));

    let path = dir.join("repository.json");
    std::fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();
    path
}

struct Host {
    dir: TempDir,
    repository: std::path::PathBuf,
}

impl Host {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let repository = seed_repository(dir.path());
        Self { dir, repository }
    }

    fn run(&self, args: &[&str]) -> Result<String, String> {
        let output = Command::new(env!("CARGO_BIN_EXE_itemflow"))
            .arg("--config")
            .arg(self.dir.path().join("config.toml"))
            .arg("--repository")
            .arg(&self.repository)
            .args(["--user", "editor", "--json"])
            .args(args)
            .env("RUST_LOG", "off")
            .output()
            .map_err(|e| format!("Failed to run itemflow: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("Command failed: {}", stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let stdout = self.run(args).unwrap();
        serde_json::from_str(&stdout).unwrap()
    }
}

#[test]
fn test_workflows_listing() {
    let host = Host::new();
    let workflows = host.run_json(&["workflows"]);
    assert_eq!(workflows[0]["workflow_id"], "editorial");
    assert_eq!(workflows[0]["initial_state"], "draft");
    assert_eq!(workflows[0]["states"], 3);
}

#[test]
fn test_execute_suspend_and_resume() {
    let host = Host::new();

    let started = host.run_json(&["start", "editorial", "article"]);
    assert_eq!(started["next_state_id"], "draft");

    let submitted = host.run_json(&["execute", "article", "submit", "--comment", "ready"]);
    assert_eq!(submitted["succeeded"], true);

    let state = host.run_json(&["state", "article"]);
    assert_eq!(state["state"]["state_id"], "review");

    let suspended = host.run_json(&["execute", "article", "legal"]);
    assert_eq!(suspended["is_completed"], false);
    let token = suspended["resume_token"].as_str().unwrap().to_string();

    let pending = host.run_json(&["pending"]);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let resumed = host.run_json(&["resume", &token]);
    assert_eq!(resumed["next_state_id"], "published");

    let history = host.run_json(&["history", "article"]);
    assert_eq!(history.as_array().unwrap().len(), 3);

    let approved = host.run_json(&["approved", "article"]);
    assert_eq!(approved["approved"], true);
}

#[test]
fn test_unknown_workflow_fails() {
    let host = Host::new();
    let error = host.run(&["start", "missing", "article"]).unwrap_err();
    assert!(error.contains("not found"));
}

#[test]
fn test_end_session_drops_pending() {
    let host = Host::new();
    host.run(&["start", "editorial", "article"]).unwrap();
    host.run(&["execute", "article", "submit"]).unwrap();
    host.run(&["--session", "desk", "execute", "article", "legal"]).unwrap();

    let ended = host.run_json(&["--session", "desk", "end-session"]);
    assert_eq!(ended["removed"], 1);
    assert!(host.run_json(&["--session", "desk", "pending"])
        .as_array()
        .unwrap()
        .is_empty());
}
