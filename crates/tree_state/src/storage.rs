//! Tree repository trait and implementations
//!
//! A stored tree is its snapshot plus a little metadata: a display name and
//! the creation time. The file backend keeps both in one `<id>.json`
//! document; the snapshot loader ignores the metadata keys.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};
use tree_core::migrate::normalize_json;
use tree_core::TreeSnapshot;

use crate::error::{Result, StorageError};

/// Name given to trees created or saved without one
pub const DEFAULT_TREE_NAME: &str = "Untitled Tree";

/// Listing entry for a stored tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSummary {
    pub id: String,
    pub name: String,
    pub node_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backing store for whole trees
#[async_trait]
pub trait TreeRepository: Send + Sync {
    /// Create an empty tree; a blank name falls back to `DEFAULT_TREE_NAME`
    async fn create(&self, tree_id: &str, name: &str) -> Result<TreeSummary>;

    /// Load a tree, normalized to the current shape
    async fn load(&self, tree_id: &str) -> Result<TreeSnapshot>;

    /// Save a tree, keeping its name and creation time.
    ///
    /// Saving the same snapshot twice yields the same stored state.
    async fn save(&self, tree_id: &str, snapshot: &TreeSnapshot) -> Result<()>;

    /// Change a tree's display name
    async fn rename(&self, tree_id: &str, name: &str) -> Result<()>;

    /// Delete a tree; deleting a missing tree is not an error
    async fn delete(&self, tree_id: &str) -> Result<()>;

    /// Stored trees, most recently updated first
    async fn list(&self) -> Result<Vec<TreeSummary>>;
}

fn validate_tree_id(tree_id: &str) -> Result<()> {
    if tree_id.is_empty() || tree_id.contains(['/', '\\']) || tree_id.contains("..") {
        return Err(StorageError::InvalidData(format!("invalid tree id '{}'", tree_id)));
    }
    Ok(())
}

fn validate_tree_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StorageError::InvalidData("tree name must not be blank".to_string()));
    }
    Ok(name.to_string())
}

fn default_tree_name() -> String {
    DEFAULT_TREE_NAME.to_string()
}

/// Metadata keys of a stored tree document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TreeMeta {
    #[serde(default = "default_tree_name")]
    name: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    nodes: Vec<IgnoredAny>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TreeDocument<'a> {
    name: &'a str,
    created_at: DateTime<Utc>,
    #[serde(flatten)]
    snapshot: &'a TreeSnapshot,
}

/// One JSON file per tree under a base directory
#[derive(Clone)]
pub struct FileTreeRepository {
    base_path: PathBuf,
}

impl FileTreeRepository {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn tree_path(&self, tree_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", tree_id))
    }

    /// Metadata of an existing tree file, `None` if there is none
    async fn read_meta(&self, path: &Path) -> Result<Option<TreeMeta>> {
        if !fs::try_exists(path).await? {
            return Ok(None);
        }
        let contents = fs::read_to_string(path).await?;
        match serde_json::from_str::<TreeMeta>(&contents) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                debug!("ignoring unreadable metadata in {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn write_document(
        &self,
        path: &Path,
        name: &str,
        created_at: DateTime<Utc>,
        snapshot: &TreeSnapshot,
    ) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        let document = TreeDocument {
            name,
            created_at,
            snapshot,
        };
        let contents = serde_json::to_string_pretty(&document)?;

        // Write to temp file first, then rename
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents).await?;
        fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl TreeRepository for FileTreeRepository {
    async fn create(&self, tree_id: &str, name: &str) -> Result<TreeSummary> {
        validate_tree_id(tree_id)?;
        let name = validate_tree_name(name).unwrap_or_else(|_| default_tree_name());
        let path = self.tree_path(tree_id);
        if fs::try_exists(&path).await? {
            return Err(StorageError::AlreadyExists(tree_id.to_string()));
        }

        let now = Utc::now();
        self.write_document(&path, &name, now, &TreeSnapshot::default())
            .await?;
        info!(tree_id, name = %name, "created tree");
        Ok(TreeSummary {
            id: tree_id.to_string(),
            name,
            node_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    async fn load(&self, tree_id: &str) -> Result<TreeSnapshot> {
        validate_tree_id(tree_id)?;
        let path = self.tree_path(tree_id);

        if !fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(tree_id.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        let snapshot = normalize_json(&contents)?;
        debug!(tree_id, nodes = snapshot.nodes.len(), "loaded tree");
        Ok(snapshot)
    }

    async fn save(&self, tree_id: &str, snapshot: &TreeSnapshot) -> Result<()> {
        validate_tree_id(tree_id)?;
        let path = self.tree_path(tree_id);

        let (name, created_at) = match self.read_meta(&path).await? {
            Some(meta) => (meta.name, meta.created_at.unwrap_or_else(Utc::now)),
            None => (default_tree_name(), Utc::now()),
        };
        self.write_document(&path, &name, created_at, snapshot)
            .await?;

        debug!(tree_id, nodes = snapshot.nodes.len(), "saved tree");
        Ok(())
    }

    async fn rename(&self, tree_id: &str, name: &str) -> Result<()> {
        validate_tree_id(tree_id)?;
        let name = validate_tree_name(name)?;
        let path = self.tree_path(tree_id);
        if !fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(tree_id.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        let meta: TreeMeta = serde_json::from_str(&contents)?;
        let snapshot = normalize_json(&contents)?;
        let created_at = meta.created_at.unwrap_or_else(Utc::now);
        self.write_document(&path, &name, created_at, &snapshot)
            .await?;
        info!(tree_id, name = %name, "renamed tree");
        Ok(())
    }

    async fn delete(&self, tree_id: &str) -> Result<()> {
        validate_tree_id(tree_id)?;
        let path = self.tree_path(tree_id);

        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<TreeSummary>> {
        if !fs::try_exists(&self.base_path).await? {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let contents = fs::read_to_string(&path).await?;
            let meta = match serde_json::from_str::<TreeMeta>(&contents) {
                Ok(meta) => meta,
                Err(e) => {
                    debug!("skipping unreadable tree file {}: {}", path.display(), e);
                    continue;
                }
            };
            let updated_at = entry
                .metadata()
                .await?
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            summaries.push(TreeSummary {
                id,
                name: meta.name,
                node_count: meta.nodes.len(),
                created_at: meta.created_at.unwrap_or(updated_at),
                updated_at,
            });
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

#[derive(Debug, Clone)]
struct MemoryTree {
    name: String,
    snapshot: TreeSnapshot,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MemoryTree {
    fn new(name: String, snapshot: TreeSnapshot) -> Self {
        let now = Utc::now();
        Self {
            name,
            snapshot,
            created_at: now,
            updated_at: now,
        }
    }

    fn summary(&self, id: &str) -> TreeSummary {
        TreeSummary {
            id: id.to_string(),
            name: self.name.clone(),
            node_count: self.snapshot.nodes.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// In-memory repository, mainly for tests
#[derive(Default)]
pub struct MemoryTreeRepository {
    trees: DashMap<String, MemoryTree>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryTreeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(self, tree_id: impl Into<String>, snapshot: TreeSnapshot) -> Self {
        self.trees
            .insert(tree_id.into(), MemoryTree::new(default_tree_name(), snapshot));
        self
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every following save fail until turned off again
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stored(&self, tree_id: &str) -> Option<TreeSnapshot> {
        self.trees.get(tree_id).map(|tree| tree.snapshot.clone())
    }
}

#[async_trait]
impl TreeRepository for MemoryTreeRepository {
    async fn create(&self, tree_id: &str, name: &str) -> Result<TreeSummary> {
        let name = validate_tree_name(name).unwrap_or_else(|_| default_tree_name());
        match self.trees.entry(tree_id.to_string()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(tree_id.to_string())),
            Entry::Vacant(slot) => {
                let tree = MemoryTree::new(name, TreeSnapshot::default());
                let summary = tree.summary(tree_id);
                slot.insert(tree);
                Ok(summary)
            }
        }
    }

    async fn load(&self, tree_id: &str) -> Result<TreeSnapshot> {
        self.stored(tree_id)
            .ok_or_else(|| StorageError::NotFound(tree_id.to_string()))
    }

    async fn save(&self, tree_id: &str, snapshot: &TreeSnapshot) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "storage unavailable",
            )));
        }
        self.trees
            .entry(tree_id.to_string())
            .and_modify(|tree| {
                tree.snapshot = snapshot.clone();
                tree.updated_at = Utc::now();
            })
            .or_insert_with(|| MemoryTree::new(default_tree_name(), snapshot.clone()));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rename(&self, tree_id: &str, name: &str) -> Result<()> {
        let name = validate_tree_name(name)?;
        let mut tree = self
            .trees
            .get_mut(tree_id)
            .ok_or_else(|| StorageError::NotFound(tree_id.to_string()))?;
        tree.name = name;
        tree.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, tree_id: &str) -> Result<()> {
        self.trees.remove(tree_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TreeSummary>> {
        let mut summaries: Vec<TreeSummary> = self
            .trees
            .iter()
            .map(|entry| entry.value().summary(entry.key()))
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}
