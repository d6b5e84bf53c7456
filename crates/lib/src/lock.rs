//! Advisory file locks for mutual exclusion between pipeline runs.
//!
//! Guards the provisioning transition and each bucket's publish sequence so
//! that concurrent runs cannot both observe "absent" and act on it.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "{lock_path} is locked by another process: {command} (PID {pid}, started at Unix timestamp {started_at_unix})\n\
             If you're sure no pkgpress process is running, remove the lock file."
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "{lock_path} is locked (could not read lock metadata)\n\
             If you're sure no pkgpress process is running, remove the lock file."
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create lock directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// An exclusive advisory lock, released when dropped.
#[derive(Debug)]
pub struct FileLock {
  _file: File,
}

impl FileLock {
  /// Acquire the lock, waiting for any current holder to release it.
  ///
  /// The holder recorded in the lock file is logged before waiting.
  pub fn acquire(lock_path: &Path, command: &str) -> Result<Self, LockError> {
    match Self::try_acquire(lock_path, command) {
      Ok(lock) => return Ok(lock),
      Err(LockError::Contention {
        command: holder, pid, ..
      }) => info!(path = %lock_path.display(), holder = %holder, pid, "waiting for lock"),
      Err(LockError::ContentionUnknown { .. }) => info!(path = %lock_path.display(), "waiting for lock"),
      Err(e) => return Err(e),
    }

    let file = open_lock_file(lock_path)?;
    lock(&file, true).map_err(LockError::LockFailed)?;
    Self::finish(file, lock_path, command)
  }

  /// [`FileLock::acquire`] on the blocking pool, so a long wait does not
  /// stall a runtime worker.
  pub async fn acquire_async(lock_path: PathBuf, command: String) -> Result<Self, LockError> {
    tokio::task::spawn_blocking(move || Self::acquire(&lock_path, &command))
      .await
      .map_err(|e| LockError::LockFailed(io::Error::other(e)))?
  }

  /// Acquire the lock or fail immediately if another process holds it.
  pub fn try_acquire(lock_path: &Path, command: &str) -> Result<Self, LockError> {
    let file = open_lock_file(lock_path)?;

    if let Err(err) = lock(&file, false) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(lock_path));
      }
      return Err(LockError::LockFailed(err));
    }

    Self::finish(file, lock_path, command)
  }

  fn finish(file: File, lock_path: &Path, command: &str) -> Result<Self, LockError> {
    write_metadata(&file, command)?;
    debug!(path = %lock_path.display(), command, "lock acquired");
    Ok(FileLock { _file: file })
  }

  #[cfg(test)]
  fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self._file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }
}

fn open_lock_file(lock_path: &Path) -> Result<File, LockError> {
  if let Some(parent) = lock_path.parent()
    && !parent.exists()
  {
    std::fs::create_dir_all(parent).map_err(LockError::CreateDir)?;
  }

  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .open(lock_path)
    .map_err(LockError::OpenFile)
}

fn write_metadata(file: &File, command: &str) -> Result<(), LockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: unix_now(),
    command: command.to_string(),
  };

  file.set_len(0).map_err(LockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(LockError::WriteMetadata)?;

  Ok(())
}

fn read_contention_error(lock_path: &Path) -> LockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return LockError::Contention {
        command: metadata.command,
        pid: metadata.pid,
        started_at_unix: metadata.started_at_unix,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  LockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

pub(crate) fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

#[cfg(unix)]
fn lock(file: &File, blocking: bool) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = if blocking {
    FlockOperation::LockExclusive
  } else {
    FlockOperation::NonBlockingLockExclusive
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn lock(_file: &File, _blocking: bool) -> io::Result<()> {
  Err(io::Error::new(
    io::ErrorKind::Unsupported,
    "advisory locking requires a Unix host",
  ))
}
