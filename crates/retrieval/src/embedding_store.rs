//! Chunk id → embedding vector, persisted as one JSON object.
//!
//! Concurrency: [`EmbeddingStore::save_one`] is a read-modify-write of the
//! whole file. Calls through one `EmbeddingStore` value are serialized by an
//! internal mutex, and every write lands through a rename so readers never
//! see a half-written file. Two *processes* backfilling the same file can
//! still lose one another's entries; the index only ever grows, so a lost
//! entry is recomputed on the next miss.

use crate::error::RetrievalError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub type EmbeddingIndex = BTreeMap<String, Vec<f32>>;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct EmbeddingStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored vector.
    ///
    /// A missing file, invalid JSON or a top-level value that is not an
    /// object all read as empty. Entries whose value is not an array are
    /// skipped; non-numeric elements read as `0.0`. Only a failure to read
    /// an existing file is an error.
    pub fn load_all(&self) -> Result<EmbeddingIndex, RetrievalError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(EmbeddingIndex::new())
            }
            Err(err) => return Err(err.into()),
        };

        let Ok(Value::Object(entries)) = serde_json::from_str::<Value>(&raw) else {
            return Ok(EmbeddingIndex::new());
        };

        Ok(entries
            .into_iter()
            .filter_map(|(id, value)| match value {
                Value::Array(items) => Some((id, items.iter().map(as_f32).collect())),
                _ => None,
            })
            .collect())
    }

    /// Stored vectors for `ids`; unknown ids are omitted.
    pub fn load_by_ids<S: AsRef<str>>(&self, ids: &[S]) -> Result<EmbeddingIndex, RetrievalError> {
        let mut all = self.load_all()?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                let id = id.as_ref();
                all.remove_entry(id)
            })
            .collect())
    }

    /// Replaces the whole index.
    pub fn save_all(&self, index: &EmbeddingIndex) -> Result<(), RetrievalError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        self.write_index(index)
    }

    /// Upserts one vector.
    pub fn save_one(&self, id: &str, vector: &[f32]) -> Result<(), RetrievalError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut all = self.load_all()?;
        all.insert(id.to_string(), vector.to_vec());
        self.write_index(&all)
    }

    fn write_index(&self, index: &EmbeddingIndex) -> Result<(), RetrievalError> {
        let dir = self
            .path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let encoded = serde_json::to_vec_pretty(index).map_err(|e| RetrievalError::Malformed {
            what: "embedding index",
            reason: e.to_string(),
        })?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "embeddings.json".to_string());
        let tmp = dir.join(format!(
            ".{file_name}.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        fs::write(&tmp, encoded)?;
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }
}

fn as_f32(value: &Value) -> f32 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0) as f32,
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    }
}
