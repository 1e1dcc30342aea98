use crate::error::ResilienceError;
use crate::state::CircuitSnapshot;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persistence backend for one breaker's [`CircuitSnapshot`].
pub trait CircuitStateStore: Send + Sync {
    /// Current snapshot; `Closed` when nothing has been persisted.
    fn load(&self) -> Result<CircuitSnapshot, ResilienceError>;

    fn save(&self, snapshot: &CircuitSnapshot) -> Result<(), ResilienceError>;

    /// Read-modify-write under exclusive access. `mutate` returns whether it
    /// changed the snapshot; only changed snapshots are written back. Returns
    /// the snapshot as left by `mutate`.
    fn update(
        &self,
        mutate: &mut dyn FnMut(&mut CircuitSnapshot) -> bool,
    ) -> Result<CircuitSnapshot, ResilienceError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<CircuitSnapshot>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: CircuitSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }
}

impl CircuitStateStore for MemoryStateStore {
    fn load(&self) -> Result<CircuitSnapshot, ResilienceError> {
        self.snapshot
            .lock()
            .map(|s| *s)
            .map_err(|_| ResilienceError::Poisoned)
    }

    fn save(&self, snapshot: &CircuitSnapshot) -> Result<(), ResilienceError> {
        let mut guard = self.snapshot.lock().map_err(|_| ResilienceError::Poisoned)?;
        *guard = *snapshot;
        Ok(())
    }

    fn update(
        &self,
        mutate: &mut dyn FnMut(&mut CircuitSnapshot) -> bool,
    ) -> Result<CircuitSnapshot, ResilienceError> {
        let mut guard = self.snapshot.lock().map_err(|_| ResilienceError::Poisoned)?;
        let mut next = *guard;
        if mutate(&mut next) {
            *guard = next;
        }
        Ok(next)
    }
}

/// JSON file shared by every process using the same breaker name.
///
/// Reads take a shared lock, writes and [`update`](CircuitStateStore::update)
/// an exclusive one. A missing, empty or undecodable file reads as `Closed`.
///
/// The locks are blocking `flock` calls made inline by the breaker, so from
/// async code a contended lock parks the calling runtime worker until the
/// holder releases it. Holders only keep the lock for one small read and
/// write, so the stall is bounded by disk latency. Use a multi-threaded
/// runtime when several processes share the file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_for_write(&self) -> Result<File, ResilienceError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?)
    }

    fn decode(&self, raw: &str) -> CircuitSnapshot {
        if raw.trim().is_empty() {
            return CircuitSnapshot::default();
        }
        serde_json::from_str(raw).unwrap_or_else(|err| {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "unreadable breaker state, treating as closed"
            );
            CircuitSnapshot::default()
        })
    }
}

fn read_locked(file: &mut File) -> std::io::Result<String> {
    let mut raw = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut raw)?;
    Ok(raw)
}

fn overwrite_locked(file: &mut File, snapshot: &CircuitSnapshot) -> Result<(), ResilienceError> {
    let encoded = serde_json::to_vec(snapshot)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&encoded)?;
    file.flush()?;
    Ok(())
}

impl CircuitStateStore for FileStateStore {
    fn load(&self) -> Result<CircuitSnapshot, ResilienceError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CircuitSnapshot::default())
            }
            Err(err) => return Err(err.into()),
        };

        FileExt::lock_shared(&file)?;
        let raw = read_locked(&mut file);
        FileExt::unlock(&file)?;

        Ok(self.decode(&raw?))
    }

    fn save(&self, snapshot: &CircuitSnapshot) -> Result<(), ResilienceError> {
        let mut file = self.open_for_write()?;
        file.lock_exclusive()?;
        let written = overwrite_locked(&mut file, snapshot);
        FileExt::unlock(&file)?;
        written
    }

    fn update(
        &self,
        mutate: &mut dyn FnMut(&mut CircuitSnapshot) -> bool,
    ) -> Result<CircuitSnapshot, ResilienceError> {
        let mut file = self.open_for_write()?;
        file.lock_exclusive()?;

        let result = read_locked(&mut file)
            .map_err(ResilienceError::from)
            .and_then(|raw| {
                let mut snapshot = self.decode(&raw);
                if mutate(&mut snapshot) {
                    overwrite_locked(&mut file, &snapshot)?;
                }
                Ok(snapshot)
            });

        FileExt::unlock(&file)?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CircuitState;
    use std::sync::Arc;

    #[test]
    fn missing_file_reads_closed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().unwrap(), CircuitSnapshot::closed());
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_or_empty_file_reads_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cb.json");
        let store = FileStateStore::new(&path);

        fs::write(&path, "").unwrap();
        assert_eq!(store.load().unwrap(), CircuitSnapshot::closed());

        fs::write(&path, "{not json").unwrap();
        assert_eq!(store.load().unwrap(), CircuitSnapshot::closed());

        fs::write(&path, r#"{"state":"melted"}"#).unwrap();
        assert_eq!(store.load().unwrap(), CircuitSnapshot::closed());
    }

    #[test]
    fn save_then_load_uses_wire_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/cb.json");
        let store = FileStateStore::new(&path);

        let snap = CircuitSnapshot::opened(3, 1_000);
        store.save(&snap).unwrap();

        assert_eq!(store.load().unwrap(), snap);
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["state"], "open");
        assert_eq!(raw["failure_count"], 3);
        assert_eq!(raw["opened_at"], 1_000);
        assert_eq!(raw["half_open_calls"], 0);
    }

    #[test]
    fn save_shrinks_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cb.json");
        fs::write(&path, " ".repeat(512)).unwrap();

        let store = FileStateStore::new(&path);
        store.save(&CircuitSnapshot::closed()).unwrap();

        assert_eq!(store.load().unwrap(), CircuitSnapshot::closed());
        assert!(fs::metadata(&path).unwrap().len() < 512);
    }

    #[test]
    fn update_skips_write_when_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cb.json");
        let store = FileStateStore::new(&path);

        let snap = store.update(&mut |_| false).unwrap();
        assert_eq!(snap, CircuitSnapshot::closed());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn concurrent_updates_do_not_lose_increments() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStateStore::new(dir.path().join("cb.json")));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .update(&mut |s| {
                                s.failure_count += 1;
                                true
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load().unwrap().failure_count, 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn contended_update_waits_without_stalling_other_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cb.json");
        let store = Arc::new(FileStateStore::new(&path));
        store.save(&CircuitSnapshot::closed()).unwrap();

        let holder = File::open(&path).unwrap();
        holder.lock_exclusive().unwrap();

        let waiting = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store.update(&mut |s| {
                    s.failure_count += 1;
                    true
                })
            })
        };

        let other = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            7
        });
        assert_eq!(other.await.unwrap(), 7);
        assert!(!waiting.is_finished());

        FileExt::unlock(&holder).unwrap();
        let snap = waiting.await.unwrap().unwrap();
        assert_eq!(snap.failure_count, 1);
        assert_eq!(store.load().unwrap().failure_count, 1);
    }

    #[test]
    fn memory_store_update_and_save() {
        let store = MemoryStateStore::new();
        let after = store
            .update(&mut |s| {
                s.state = CircuitState::HalfOpen;
                true
            })
            .unwrap();
        assert_eq!(after.state, CircuitState::HalfOpen);
        assert_eq!(store.load().unwrap().state, CircuitState::HalfOpen);

        store.save(&CircuitSnapshot::closed()).unwrap();
        assert_eq!(store.load().unwrap(), CircuitSnapshot::closed());
    }
}
