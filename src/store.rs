//! Durable key/value storage for the progress document.
//!
//! The in-memory document uses real sets; the persisted JSON carries them as
//! arrays. Conversion happens here and nowhere else.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{ProgressError, Result};
use crate::model::{ModuleActivities, ModuleId, ProgressDocument, UserProfile};

pub const PERSISTED_VERSION: u32 = 1;

/// Minimal string key/value backend, the shape of browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Returns whether an entry was removed.
    fn remove(&self, key: &str) -> Result<bool>;
}

// ── File backend ────────────────────────────────────────────────────────────

/// One JSON file per key inside `dir`.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Write-then-rename so a crash never leaves a half-written document
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// ── Memory backend ──────────────────────────────────────────────────────────

/// In-process backend. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries().remove(key).is_some())
    }
}

// ── Persisted form ──────────────────────────────────────────────────────────

fn persisted_version() -> u32 {
    PERSISTED_VERSION
}

/// JSON shape of the stored document: sets travel as arrays.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedProgress {
    #[serde(default = "persisted_version")]
    pub version: u32,
    #[serde(default)]
    pub user_profile: UserProfile,
    #[serde(default)]
    pub unlocked_module_ids: Vec<ModuleId>,
    #[serde(default)]
    pub completed_module_ids: Vec<ModuleId>,
    #[serde(default)]
    pub per_module_activity_state: BTreeMap<ModuleId, ModuleActivities>,
    #[serde(default)]
    pub achievements_earned: Vec<String>,
}

pub fn to_persisted(doc: &ProgressDocument) -> PersistedProgress {
    PersistedProgress {
        version: PERSISTED_VERSION,
        user_profile: doc.user_profile.clone(),
        unlocked_module_ids: doc.unlocked_module_ids.iter().copied().collect(),
        completed_module_ids: doc.completed_module_ids.iter().copied().collect(),
        per_module_activity_state: doc.per_module_activity_state.clone(),
        achievements_earned: doc.achievements_earned.iter().cloned().collect(),
    }
}

/// Turns the arrays back into sets and validates the result.
pub fn revive(persisted: PersistedProgress) -> Result<ProgressDocument> {
    if persisted.version > PERSISTED_VERSION {
        return Err(ProgressError::StorageCorruption(format!(
            "unsupported document version {}",
            persisted.version
        )));
    }

    let mut unlocked: BTreeSet<ModuleId> = persisted.unlocked_module_ids.into_iter().collect();
    // An empty array is an old document that predates unlock tracking
    if unlocked.is_empty() {
        unlocked.insert(ModuleId::FIRST);
    }

    let doc = ProgressDocument {
        user_profile: persisted.user_profile,
        unlocked_module_ids: unlocked,
        completed_module_ids: persisted.completed_module_ids.into_iter().collect(),
        per_module_activity_state: persisted.per_module_activity_state,
        achievements_earned: persisted.achievements_earned.into_iter().collect(),
    };
    doc.check_invariants()
        .map_err(ProgressError::StorageCorruption)?;
    Ok(doc)
}

pub fn encode(doc: &ProgressDocument) -> Result<String> {
    Ok(serde_json::to_string(&to_persisted(doc))?)
}

pub fn decode(raw: &str) -> Result<ProgressDocument> {
    let persisted: PersistedProgress = serde_json::from_str(raw)
        .map_err(|e| ProgressError::StorageCorruption(e.to_string()))?;
    revive(persisted)
}

// ── Adapter ─────────────────────────────────────────────────────────────────

/// Reads and writes the progress document under one key of a backend.
pub struct ProgressStore {
    backend: Box<dyn KeyValueStore>,
    key: String,
}

impl ProgressStore {
    pub fn new(backend: impl KeyValueStore + 'static, key: &str) -> Self {
        Self {
            backend: Box::new(backend),
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `Ok(None)` when nothing is stored; `StorageCorruption` when the stored
    /// entry does not parse or validate.
    pub fn load(&self) -> Result<Option<ProgressDocument>> {
        match self.backend.get(&self.key)? {
            None => Ok(None),
            Some(raw) => decode(&raw).map(Some),
        }
    }

    pub fn save(&self, doc: &ProgressDocument) -> Result<()> {
        let raw = encode(doc)?;
        self.backend.set(&self.key, &raw)?;
        debug!(key = %self.key, bytes = raw.len(), "Progress persisted");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let removed = self.backend.remove(&self.key)?;
        debug!(key = %self.key, removed, "Persisted progress cleared");
        Ok(())
    }
}
