//! Directory-backed store.
//!
//! ```text
//! <root>/
//! ├── databases/<key>.json   StoredDatabase
//! └── methods/<key>.json     StoredMethod
//! ```
//!
//! Keys come from [`super::storage_key`]. Files are replaced atomically.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{storage_key, RecordSink};
use crate::config::DEFAULT_STORE_DIR;
use crate::error::{SinkError, SinkResult};
use crate::models::{CharacterizationEntry, FlowId, FlowRecord, MethodName};

/// A stored database and its flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDatabase {
    pub name: String,
    pub created_at: String,
    pub modified_at: String,
    pub flows: Vec<FlowRecord>,
}

impl StoredDatabase {
    fn new(name: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name: name.to_string(),
            created_at: now.clone(),
            modified_at: now,
            flows: Vec::new(),
        }
    }

    /// Replace flows with a known id in place, append the others.
    fn upsert(&mut self, flows: &[FlowRecord]) {
        let mut index: HashMap<FlowId, usize> = self
            .flows
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id, i))
            .collect();

        for flow in flows {
            match index.get(&flow.id) {
                Some(&i) => self.flows[i] = flow.clone(),
                None => {
                    index.insert(flow.id, self.flows.len());
                    self.flows.push(flow.clone());
                }
            }
        }
        self.modified_at = chrono::Utc::now().to_rfc3339();
    }
}

/// A stored impact assessment method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMethod {
    pub name: MethodName,
    #[serde(default)]
    pub unit: Option<String>,
    pub created_at: String,
    pub modified_at: String,
    pub factors: Vec<CharacterizationEntry>,
}

/// Store writing JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Store rooted at `dir`; directories are created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            root: dir.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn databases_dir(&self) -> PathBuf {
        self.root.join("databases")
    }

    fn methods_dir(&self) -> PathBuf {
        self.root.join("methods")
    }

    fn database_path(&self, name: &str) -> PathBuf {
        self.databases_dir().join(format!("{}.json", storage_key(name)))
    }

    fn method_path(&self, method: &MethodName) -> PathBuf {
        self.methods_dir()
            .join(format!("{}.json", storage_key(&method.to_string())))
    }

    /// Every stored database, sorted by name.
    pub fn databases(&self) -> SinkResult<Vec<StoredDatabase>> {
        let mut databases: Vec<StoredDatabase> = read_all(&self.databases_dir())?;
        databases.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(databases)
    }

    /// Every stored method, sorted by name.
    pub fn methods(&self) -> SinkResult<Vec<StoredMethod>> {
        let mut methods: Vec<StoredMethod> = read_all(&self.methods_dir())?;
        methods.sort_by_key(|m| m.name.to_string());
        Ok(methods)
    }

    pub fn database(&self, name: &str) -> SinkResult<StoredDatabase> {
        read_one(&self.database_path(name))?
            .ok_or_else(|| SinkError::NotFound(format!("database '{name}'")))
    }

    pub fn method(&self, method: &MethodName) -> SinkResult<StoredMethod> {
        read_one(&self.method_path(method))?
            .ok_or_else(|| SinkError::NotFound(format!("method '{method}'")))
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_DIR)
    }
}

impl RecordSink for LocalStore {
    async fn write_database(&mut self, database: &str, flows: &[FlowRecord]) -> SinkResult<()> {
        let path = self.database_path(database);
        let mut stored = read_one_async::<StoredDatabase>(&path)
            .await?
            .unwrap_or_else(|| StoredDatabase::new(database));

        stored.upsert(flows);
        write_atomic(&path, &stored).await
    }

    async fn load_method(&mut self, method: &MethodName) -> SinkResult<Vec<CharacterizationEntry>> {
        let stored = read_one_async::<StoredMethod>(&self.method_path(method)).await?;
        Ok(stored.map(|m| m.factors).unwrap_or_default())
    }

    async fn write_method(
        &mut self,
        method: &MethodName,
        factors: &[CharacterizationEntry],
        unit: Option<&str>,
    ) -> SinkResult<()> {
        let path = self.method_path(method);
        let now = chrono::Utc::now().to_rfc3339();

        let stored = match read_one_async::<StoredMethod>(&path).await? {
            Some(existing) => StoredMethod {
                unit: unit.map(String::from).or(existing.unit),
                modified_at: now,
                factors: factors.to_vec(),
                ..existing
            },
            None => StoredMethod {
                name: method.clone(),
                unit: unit.map(String::from),
                created_at: now.clone(),
                modified_at: now,
                factors: factors.to_vec(),
            },
        };

        write_atomic(&path, &stored).await
    }
}

fn read_one<T: DeserializeOwned>(path: &Path) -> SinkResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn read_one_async<T: DeserializeOwned>(path: &Path) -> SinkResult<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read every `*.json` file of `dir`. Unreadable entries are skipped.
fn read_all<T: DeserializeOwned>(dir: &Path) -> SinkResult<Vec<T>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut items = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.extension().is_some_and(|e| e == "json") {
            continue;
        }
        match read_one(&path) {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %path.display(), "skipping store file: {e}"),
        }
    }
    Ok(items)
}

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> SinkResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
