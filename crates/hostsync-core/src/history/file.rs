// # File Execution Log
//
// File-based implementation of ExecutionLog with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Automatic backup: `.backup` holds the previous good file
// - Recovery: falls back to the backup when the main file fails to parse
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "entries": [
//     {
//       "job_id": "2025-01-09T12:00:00.000Z::cloudflare-dns::add::app.example.com",
//       "job_type": "ApplyChanges",
//       "operation_type": "add",
//       "hostname": "app.example.com",
//       "target": "cloudflare-dns",
//       "timestamp": "2025-01-09T12:00:10Z",
//       "dry_run": false
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::execution_log::{ExecutionEntry, ExecutionLog, page_newest_first};

/// History file format version
const HISTORY_FILE_VERSION: &str = "1.0";

/// Default number of entries kept on disk
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// File-based execution log with crash recovery
///
/// Every `record()` rewrites the file atomically. History is small and
/// written only when a host change completes.
///
/// # Example
///
/// ```rust,no_run
/// use hostsync_core::history::FileExecutionLog;
/// use hostsync_core::ExecutionLog;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let log = FileExecutionLog::new("/var/lib/hostsync/history.json").await?;
///     println!("{} entries", log.count().await?);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileExecutionLog {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
    max_entries: usize,
}

#[derive(Debug)]
struct FileState {
    entries: Vec<ExecutionEntry>,
    dirty: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct HistoryFileFormat {
    version: String,
    entries: Vec<ExecutionEntry>,
}

impl FileExecutionLog {
    /// Create or load a file execution log
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing file
    /// 3. On a parse failure, load the backup instead
    /// 4. If both fail, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::with_max_entries(path, DEFAULT_MAX_ENTRIES).await
    }

    /// Like [`FileExecutionLog::new`], keeping at most `max_entries` entries
    pub async fn with_max_entries<P: AsRef<Path>>(
        path: P,
        max_entries: usize,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create history directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let entries = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                entries,
                dirty: false,
            })),
            max_entries: max_entries.max(1),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<Vec<ExecutionEntry>, Error> {
        match Self::load(path).await {
            Ok(entries) => {
                tracing::debug!("Loaded execution history: {} entries", entries.len());
                Ok(entries)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "History file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No history backup found. Starting with empty history.");
                    return Ok(Vec::new());
                }

                match Self::load(&backup_path).await {
                    Ok(entries) => {
                        tracing::info!("Recovered history from backup: {} entries", entries.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore history file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(entries)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "History backup also unreadable: {}. Starting with empty history.",
                            backup_err
                        );
                        Ok(Vec::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Vec<ExecutionEntry>, Error> {
        if !path.exists() {
            tracing::debug!("History file does not exist: {}", path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::history(format!(
                "Failed to read history file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: HistoryFileFormat = serde_json::from_str(&content)?;

        if file.version != HISTORY_FILE_VERSION {
            tracing::warn!(
                "History file version mismatch: expected {}, got {}. Attempting to load anyway.",
                HISTORY_FILE_VERSION,
                file.version
            );
        }

        Ok(file.entries)
    }

    /// Write the history atomically
    async fn write(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;

        let json = serde_json::to_string_pretty(&HistoryFileFormat {
            version: HISTORY_FILE_VERSION.to_string(),
            entries: state.entries.clone(),
        })?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::history(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create history backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::history(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state.dirty = false;
        tracing::trace!("History written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl ExecutionLog for FileExecutionLog {
    async fn record(&self, entry: ExecutionEntry) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            state.entries.push(entry);
            if state.entries.len() > self.max_entries {
                let overflow = state.entries.len() - self.max_entries;
                state.entries.drain(..overflow);
            }
            state.dirty = true;
        }

        self.write().await
    }

    async fn list(&self, page: usize, page_size: usize) -> Result<Vec<ExecutionEntry>, Error> {
        let state = self.state.read().await;
        Ok(page_newest_first(&state.entries, page, page_size))
    }

    async fn count(&self) -> Result<usize, Error> {
        Ok(self.state.read().await.entries.len())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty { self.write().await } else { Ok(()) }
    }
}
