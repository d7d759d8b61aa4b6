//! Repository persistence using a JSON (or YAML) document
//!
//! [`JsonRepository`] keeps the whole document in memory behind a mutex and
//! writes it back after every mutation. It implements every collaborator the
//! engine consumes, which makes it the backing store of the CLI host and of the
//! integration tests.

use crate::models::{
    template_ids, AccessRight, CommentFields, HistoryEntry, Item, ItemRef, Principal, WorkflowInfo,
};
use crate::workflow::engine::WorkflowServices;
use crate::workflow::plugins::PluginLoader;
use crate::workflow::resumable::{
    CallbackRegistration, ContinuationKey, PendingExecution, ResumableStore,
};
use crate::workflow::store::{AuthorizationOracle, HistoryStore, ItemStore};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Wildcard principal in access rules
pub const ANY_PRINCIPAL: &str = "*";

/// Template with its base templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    #[serde(default)]
    pub base_templates: Vec<String>,
}

/// Stored item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, String>,
    /// Version numbers of a content item
    #[serde(default = "default_versions")]
    pub versions: Vec<u32>,
}

fn default_versions() -> Vec<u32> {
    vec![1]
}

impl ItemRecord {
    pub fn new(id: impl Into<String>, template: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            display_name: None,
            icon: None,
            template: template.into(),
            parent: None,
            fields: HashMap::new(),
            versions: default_versions(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_versions(mut self, versions: Vec<u32>) -> Self {
        self.versions = versions;
        self
    }

    fn to_item(&self) -> Item {
        Item {
            id: self.id.clone(),
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            icon: self.icon.clone(),
            template: self.template.clone(),
            parent: self.parent.clone(),
            fields: self.fields.clone(),
        }
    }
}

/// Workflow binding of one item version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInfoRecord {
    pub item: ItemRef,
    #[serde(flatten)]
    pub info: WorkflowInfo,
}

/// Grants or denies a right on an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRule {
    pub item_id: String,
    pub right: AccessRight,
    /// Principal name, or `*` for everyone
    pub principal: String,
    pub allow: bool,
}

impl AccessRule {
    pub fn deny(item_id: impl Into<String>, right: AccessRight, principal: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            right,
            principal: principal.into(),
            allow: false,
        }
    }

    pub fn allow(item_id: impl Into<String>, right: AccessRight, principal: impl Into<String>) -> Self {
        Self {
            allow: true,
            ..Self::deny(item_id, right, principal)
        }
    }
}

/// Edit lock held on an item version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditLock {
    pub item: ItemRef,
    pub owner: String,
}

/// Root document containing all repository data
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepositoryDocument {
    #[serde(default)]
    pub templates: Vec<TemplateRecord>,
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub workflow_states: Vec<WorkflowInfoRecord>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub access_rules: Vec<AccessRule>,
    #[serde(default)]
    pub locks: Vec<EditLock>,
    #[serde(default)]
    pub pending: Vec<PendingExecution>,
    #[serde(default)]
    pub callbacks: Vec<CallbackRegistration>,
}

impl RepositoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, id: impl Into<String>, base_templates: &[&str]) -> Self {
        self.templates.push(TemplateRecord {
            id: id.into(),
            base_templates: base_templates.iter().map(|b| b.to_string()).collect(),
        });
        self
    }

    pub fn with_item(mut self, item: ItemRecord) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_access_rule(mut self, rule: AccessRule) -> Self {
        self.access_rules.push(rule);
        self
    }

    pub fn with_lock(mut self, item: ItemRef, owner: impl Into<String>) -> Self {
        self.locks.push(EditLock {
            item,
            owner: owner.into(),
        });
        self
    }

    fn item(&self, id: &str) -> Option<&ItemRecord> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Whether `template` is `target` or inherits from it
    fn template_descends(&self, template: &str, target: &str) -> bool {
        let mut visited = HashSet::new();
        let mut queue = vec![template.to_string()];
        while let Some(current) = queue.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(record) = self.templates.iter().find(|t| t.id == current) {
                queue.extend(record.base_templates.iter().cloned());
            }
        }
        false
    }
}

/// Document format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => DocumentFormat::Yaml,
            _ => DocumentFormat::Json,
        }
    }
}

/// Repository backed by a single document
pub struct JsonRepository {
    /// Path to the document, None for an in-memory repository
    store_path: Option<PathBuf>,
    /// In-memory data store
    store: Arc<Mutex<RepositoryDocument>>,
}

impl JsonRepository {
    /// Open a repository file, starting empty when it doesn't exist
    pub fn open<P: AsRef<Path>>(store_path: P) -> Result<Self> {
        let store_path = store_path.as_ref().to_path_buf();

        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create repository directory")?;
        }

        let store = if store_path.exists() {
            Self::load_store(&store_path)?
        } else {
            RepositoryDocument::default()
        };

        Ok(Self {
            store_path: Some(store_path),
            store: Arc::new(Mutex::new(store)),
        })
    }

    /// Create a file-backed repository seeded with `document`
    pub fn create<P: AsRef<Path>>(store_path: P, document: RepositoryDocument) -> Result<Self> {
        let repository = Self::open(store_path)?;
        {
            let mut store = repository.document()?;
            *store = document;
            repository.save_store(&store)?;
        }
        Ok(repository)
    }

    /// Repository that never touches the filesystem
    pub fn in_memory(document: RepositoryDocument) -> Self {
        Self {
            store_path: None,
            store: Arc::new(Mutex::new(document)),
        }
    }

    /// Bundle this repository as every engine collaborator
    pub fn services(self: &Arc<Self>, plugins: Arc<dyn PluginLoader>) -> WorkflowServices {
        WorkflowServices::new(
            self.clone(),
            self.clone(),
            self.clone(),
            plugins,
            self.clone(),
        )
    }

    /// Copy of the current document
    pub fn snapshot(&self) -> Result<RepositoryDocument> {
        Ok(self.document()?.clone())
    }

    /// Load document from file with file locking
    fn load_store(path: &Path) -> Result<RepositoryDocument> {
        let file = File::open(path).context("Failed to open repository file")?;

        file.lock_shared()
            .context("Failed to acquire read lock on repository")?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(file);
        reader
            .read_to_string(&mut contents)
            .context("Failed to read repository")?;

        // Release lock automatically when file goes out of scope
        drop(reader);

        if contents.trim().is_empty() {
            return Ok(RepositoryDocument::default());
        }

        match DocumentFormat::for_path(path) {
            DocumentFormat::Json => {
                serde_json::from_str(&contents).context("Failed to parse repository JSON")
            }
            DocumentFormat::Yaml => {
                serde_yaml::from_str(&contents).context("Failed to parse repository YAML")
            }
        }
    }

    /// Save document to file with file locking
    ///
    /// Callers hold the document guard until this returns.
    fn save_store(&self, store: &RepositoryDocument) -> Result<()> {
        let Some(store_path) = &self.store_path else {
            return Ok(());
        };

        let serialized = match DocumentFormat::for_path(store_path) {
            DocumentFormat::Json => {
                serde_json::to_string_pretty(store).context("Failed to serialize repository")?
            }
            DocumentFormat::Yaml => {
                serde_yaml::to_string(store).context("Failed to serialize repository")?
            }
        };

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(store_path)
            .context("Failed to open repository file for writing")?;

        file.lock_exclusive()
            .context("Failed to acquire write lock on repository")?;

        let mut writer = std::io::BufWriter::new(file);
        writer
            .write_all(serialized.as_bytes())
            .context("Failed to write repository")?;
        writer
            .flush()
            .context("Failed to flush repository to disk")?;

        Ok(())
    }

    fn document(&self) -> Result<MutexGuard<'_, RepositoryDocument>> {
        self.store
            .lock()
            .map_err(|_| anyhow!("Repository lock poisoned"))
    }

    /// Apply a mutation and persist the document
    fn update<T>(&self, mutate: impl FnOnce(&mut RepositoryDocument) -> T) -> Result<T> {
        let mut store = self.document()?;
        let result = mutate(&mut store);
        self.save_store(&store)?;
        Ok(result)
    }
}

#[async_trait]
impl ItemStore for JsonRepository {
    async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        Ok(self.document()?.item(id).map(ItemRecord::to_item))
    }

    async fn get_children(&self, id: &str) -> Result<Vec<Item>> {
        let store = self.document()?;
        Ok(store
            .items
            .iter()
            .filter(|i| i.parent.as_deref() == Some(id))
            .map(ItemRecord::to_item)
            .collect())
    }

    async fn get_versions(&self, id: &str) -> Result<Vec<ItemRef>> {
        let store = self.document()?;
        Ok(store
            .item(id)
            .map(|record| {
                record
                    .versions
                    .iter()
                    .map(|version| ItemRef::new(id, *version))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn descends_from(&self, item: &Item, template_id: &str) -> Result<bool> {
        Ok(self.document()?.template_descends(&item.template, template_id))
    }

    async fn get_workflow_info(&self, item: &ItemRef) -> Result<Option<WorkflowInfo>> {
        let store = self.document()?;
        Ok(store
            .workflow_states
            .iter()
            .find(|r| r.item == *item)
            .map(|r| r.info.clone()))
    }

    async fn set_workflow_info(&self, item: &ItemRef, info: WorkflowInfo) -> Result<()> {
        self.update(|store| {
            match store.workflow_states.iter_mut().find(|r| r.item == *item) {
                Some(record) => record.info = info,
                None => store.workflow_states.push(WorkflowInfoRecord {
                    item: item.clone(),
                    info,
                }),
            }
        })
    }

    async fn get_items_in_state(&self, workflow_id: &str, state_id: &str) -> Result<Vec<ItemRef>> {
        let store = self.document()?;
        Ok(store
            .workflow_states
            .iter()
            .filter(|r| r.info.workflow_id == workflow_id && r.info.state_id == state_id)
            .map(|r| r.item.clone())
            .collect())
    }

    async fn get_workflow_ids(&self) -> Result<Vec<String>> {
        let store = self.document()?;
        Ok(store
            .items
            .iter()
            .filter(|i| store.template_descends(&i.template, template_ids::WORKFLOW))
            .map(|i| i.id.clone())
            .collect())
    }

    async fn release_edit_lock(&self, item: &ItemRef, principal: &Principal) -> Result<()> {
        let released = self.update(|store| {
            let before = store.locks.len();
            store
                .locks
                .retain(|lock| !(lock.item == *item && lock.owner == principal.name));
            before != store.locks.len()
        })?;
        if released {
            tracing::debug!(item = %item, user = %principal, "Edit lock released");
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for JsonRepository {
    async fn add_history(
        &self,
        item: &ItemRef,
        old_state_id: Option<&str>,
        new_state_id: &str,
        comment_fields: &CommentFields,
        principal: &Principal,
    ) -> Result<()> {
        let entry = HistoryEntry::new(
            item.clone(),
            old_state_id.map(str::to_string),
            new_state_id.to_string(),
            comment_fields.clone(),
            principal,
        );
        self.update(|store| store.history.push(entry))
    }

    async fn clear_history(&self, item: &ItemRef) -> Result<()> {
        self.update(|store| store.history.retain(|entry| entry.item != *item))
    }

    async fn get_history(&self, item: &ItemRef) -> Result<Vec<HistoryEntry>> {
        let store = self.document()?;
        Ok(store
            .history
            .iter()
            .filter(|entry| entry.item == *item)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuthorizationOracle for JsonRepository {
    /// A rule naming the principal beats a wildcard rule; deny wins a tie
    async fn is_allowed(&self, item: &Item, right: &AccessRight, principal: &Principal) -> Result<bool> {
        let store = self.document()?;
        let rules: Vec<&AccessRule> = store
            .access_rules
            .iter()
            .filter(|rule| rule.item_id == item.id && rule.right == *right)
            .collect();

        for holder in [principal.name.as_str(), ANY_PRINCIPAL] {
            let mut matching = rules.iter().filter(|rule| rule.principal == holder).peekable();
            if matching.peek().is_some() {
                return Ok(matching.all(|rule| rule.allow));
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl ResumableStore for JsonRepository {
    async fn register_callback(&self, registration: CallbackRegistration) -> Result<()> {
        self.update(|store| {
            store.callbacks.retain(|c| c.key != registration.key);
            store.callbacks.push(registration);
        })
    }

    async fn take_callback(&self, key: &ContinuationKey) -> Result<Option<CallbackRegistration>> {
        self.update(|store| {
            let position = store.callbacks.iter().position(|c| c.key == *key)?;
            Some(store.callbacks.remove(position))
        })
    }

    async fn save_pending(&self, pending: PendingExecution) -> Result<()> {
        self.update(|store| {
            store.pending.retain(|p| p.key != pending.key);
            store.pending.push(pending);
        })
    }

    async fn take_pending(&self, key: &ContinuationKey) -> Result<Option<PendingExecution>> {
        self.update(|store| {
            let position = store.pending.iter().position(|p| p.key == *key)?;
            Some(store.pending.remove(position))
        })
    }

    async fn list_pending(&self, session: &str) -> Result<Vec<PendingExecution>> {
        let store = self.document()?;
        Ok(store
            .pending
            .iter()
            .filter(|p| p.key.session == session)
            .cloned()
            .collect())
    }

    async fn end_session(&self, session: &str) -> Result<usize> {
        let removed = self.update(|store| {
            let before = store.callbacks.len() + store.pending.len();
            store.callbacks.retain(|c| c.key.session != session);
            store.pending.retain(|p| p.key.session != session);
            before - (store.callbacks.len() + store.pending.len())
        })?;
        tracing::info!(session = session, removed = removed, "Session ended");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::comment_fields;
    use tempfile::tempdir;

    fn sample_document() -> RepositoryDocument {
        RepositoryDocument::new()
            .with_template("news-command", &[template_ids::WORKFLOW_COMMAND])
            .with_template("press-command", &["news-command"])
            .with_item(ItemRecord::new("sample", template_ids::WORKFLOW))
            .with_item(ItemRecord::new("draft", template_ids::WORKFLOW_STATE).with_parent("sample"))
            .with_item(ItemRecord::new("submit", "press-command").with_parent("draft"))
            .with_item(ItemRecord::new("home", "page").with_versions(vec![1, 2]))
    }

    #[test]
    fn test_repository_initialization() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("nested").join("repository.json");

        let repository = JsonRepository::open(&store_path).unwrap();

        // File may not exist until first save, but parent directory should exist
        assert!(store_path.parent().unwrap().exists());
        assert!(repository.snapshot().unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_template_inheritance() {
        let repository = JsonRepository::in_memory(sample_document());
        let submit = repository.get_item("submit").await.unwrap().unwrap();

        assert!(repository
            .descends_from(&submit, template_ids::WORKFLOW_COMMAND)
            .await
            .unwrap());
        assert!(!repository
            .descends_from(&submit, template_ids::WORKFLOW_STATE)
            .await
            .unwrap());
    }

    #[test]
    fn test_template_cycle_terminates() {
        let document = RepositoryDocument::new()
            .with_template("a", &["b"])
            .with_template("b", &["a"]);
        assert!(!document.template_descends("a", "c"));
        assert!(document.template_descends("a", "b"));
    }

    #[tokio::test]
    async fn test_workflow_info_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("repository.json");
        let item = ItemRef::new("home", 2);

        {
            let repository = JsonRepository::create(&store_path, sample_document()).unwrap();
            repository
                .set_workflow_info(&item, WorkflowInfo::new("sample", "draft"))
                .await
                .unwrap();
            repository
                .add_history(&item, None, "draft", &comment_fields("Item created"), &Principal::new("editor"))
                .await
                .unwrap();
        }

        let reopened = JsonRepository::open(&store_path).unwrap();
        assert_eq!(
            reopened.get_workflow_info(&item).await.unwrap(),
            Some(WorkflowInfo::new("sample", "draft"))
        );
        assert_eq!(reopened.get_history(&item).await.unwrap().len(), 1);
        assert!(reopened
            .get_workflow_info(&ItemRef::new("home", 1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_all_reach_disk() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("repository.json");
        let item = ItemRef::new("home", 1);
        let repository = Arc::new(JsonRepository::create(&store_path, sample_document()).unwrap());

        let mut handles = Vec::new();
        for n in 0..32 {
            let repository = repository.clone();
            let item = item.clone();
            handles.push(tokio::spawn(async move {
                repository
                    .add_history(
                        &item,
                        None,
                        &format!("state-{n}"),
                        &comment_fields("concurrent"),
                        &Principal::new("editor"),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = JsonRepository::open(&store_path).unwrap();
        assert_eq!(reopened.get_history(&item).await.unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_yaml_document() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("repository.yaml");
        JsonRepository::create(&store_path, sample_document()).unwrap();

        let contents = std::fs::read_to_string(&store_path).unwrap();
        assert!(contents.contains("press-command"));

        let reopened = JsonRepository::open(&store_path).unwrap();
        assert_eq!(reopened.get_workflow_ids().await.unwrap(), vec!["sample"]);
    }

    #[tokio::test]
    async fn test_access_rule_precedence() {
        let repository = JsonRepository::in_memory(
            sample_document()
                .with_access_rule(AccessRule::deny("submit", AccessRight::WorkflowCommandExecute, ANY_PRINCIPAL))
                .with_access_rule(AccessRule::allow("submit", AccessRight::WorkflowCommandExecute, "chief")),
        );
        let submit = repository.get_item("submit").await.unwrap().unwrap();
        let right = AccessRight::WorkflowCommandExecute;

        assert!(!repository.is_allowed(&submit, &right, &Principal::new("editor")).await.unwrap());
        assert!(repository.is_allowed(&submit, &right, &Principal::new("chief")).await.unwrap());
        assert!(repository
            .is_allowed(&submit, &AccessRight::WorkflowStateWrite, &Principal::new("editor"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_release_edit_lock_only_for_owner() {
        let item = ItemRef::new("home", 1);
        let repository = JsonRepository::in_memory(sample_document().with_lock(item.clone(), "editor"));

        repository.release_edit_lock(&item, &Principal::new("someone")).await.unwrap();
        assert_eq!(repository.snapshot().unwrap().locks.len(), 1);

        repository.release_edit_lock(&item, &Principal::new("editor")).await.unwrap();
        assert!(repository.snapshot().unwrap().locks.is_empty());
    }

    #[tokio::test]
    async fn test_versions_and_children() {
        let repository = JsonRepository::in_memory(sample_document());
        assert_eq!(
            repository.get_versions("home").await.unwrap(),
            vec![ItemRef::new("home", 1), ItemRef::new("home", 2)]
        );
        assert!(repository.get_versions("missing").await.unwrap().is_empty());

        let children = repository.get_children("draft").await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "submit");
    }
}
