//! File-backed backend: an append-only JSON Lines log of build records.
//!
//! Every saved build becomes one line, written and fsynced before
//! `save_build` returns. On open the log is replayed into an in-memory index;
//! a torn final line left by a crash mid-write is truncated so the log always
//! holds a valid prefix of records.
//!
//! A failed append is cut back to the last committed length, and the length
//! is checked again before every append, so a partial record never sits in
//! front of an acknowledged one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::types::{BuildNumber, Patch, PatchBuild};

use super::{Backend, BackendError, MemoryBackend, Result};

/// One line of the build log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub build: PatchBuild,
    pub recorded_at: DateTime<Utc>,
}

/// A backend persisted to a JSON Lines file.
pub struct FileBackend {
    path: PathBuf,
    /// Holding the lock serializes check-then-append.
    log: Mutex<LogFile>,
    index: MemoryBackend,
}

/// Append handle plus the length covered by acknowledged records.
struct LogFile {
    file: File,
    committed_len: u64,
}

impl LogFile {
    /// Cuts off anything past the committed length.
    fn repair(&mut self) -> io::Result<()> {
        let len = self.file.metadata()?.len();
        if len != self.committed_len {
            warn!(
                len,
                committed_len = self.committed_len,
                "Discarding uncommitted bytes at end of build log"
            );
            self.file.set_len(self.committed_len)?;
        }
        Ok(())
    }

    /// Appends `line` using `write`, which must also make it durable. On
    /// failure the file is rolled back to the committed length.
    fn append_with<F>(&mut self, line: &[u8], write: F) -> io::Result<()>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        self.repair()?;

        if let Err(e) = write(&mut self.file, line) {
            // A failed rollback is retried by the next append.
            if let Err(rollback) = self.repair() {
                error!(error = %rollback, "Failed to roll back partial build record");
            }
            return Err(e);
        }

        self.committed_len += line.len() as u64;
        Ok(())
    }

    fn append(&mut self, line: &[u8]) -> io::Result<()> {
        self.append_with(line, |file, line| {
            file.write_all(line)?;
            file.sync_all()
        })
    }
}

impl FileBackend {
    /// Opens (or creates) the log at `path` and replays existing records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let created = !path.exists();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let index = MemoryBackend::new();
        for record in replay(&path)? {
            if let Err(e) = index.save_build(&record.build) {
                warn!(error = %e, "Skipping duplicate record in build log");
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let committed_len = file.metadata()?.len();
        if created && let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            // Make the new directory entry durable.
            File::open(parent)?.sync_all()?;
        }

        debug!(path = %path.display(), records = index.len(), "Opened build log");

        Ok(FileBackend {
            path,
            log: Mutex::new(LogFile {
                file,
                committed_len,
            }),
            index,
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of build records held.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .field("records", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl Backend for FileBackend {
    fn save_build(&self, build: &PatchBuild) -> Result<()> {
        let mut log = self.log.lock().map_err(|_| BackendError::Poisoned)?;

        if let Some(existing) = self.index.get_patch(&build.patch)? {
            return Err(BackendError::DuplicatePatch {
                patch: build.patch,
                existing: existing.build_number,
            });
        }

        let record = BuildRecord {
            build: build.clone(),
            recorded_at: Utc::now(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        log.append(&line)?;

        self.index.save_build(build)
    }

    fn get_build(&self, build_number: BuildNumber) -> Result<Option<PatchBuild>> {
        self.index.get_build(build_number)
    }

    fn get_patch(&self, patch: &Patch) -> Result<Option<PatchBuild>> {
        self.index.get_patch(patch)
    }
}

/// Reads every complete record, truncating the file at the first bad line.
fn replay(path: &Path) -> Result<Vec<BuildRecord>> {
    if !path.exists() {
        return Ok(vec![]);
    }

    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut position = 0u64;
    let mut valid_len = 0u64;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }
        let line_start = position;
        position += bytes_read as u64;

        if !line.ends_with('\n') {
            // Never acknowledged: the newline is part of every committed record.
            warn!(
                path = %path.display(),
                offset = line_start,
                "Truncating unterminated tail of build log"
            );
            valid_len = line_start;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            valid_len = position;
            continue;
        }

        match serde_json::from_str::<BuildRecord>(trimmed) {
            Ok(record) => {
                records.push(record);
                valid_len = position;
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    offset = line_start,
                    error = %e,
                    "Truncating unreadable tail of build log"
                );
                valid_len = line_start;
                break;
            }
        }
    }

    if valid_len < file_len {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        file.sync_all()?;
    }

    Ok(records)
}
