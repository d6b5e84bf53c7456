//! Repository publishing.
//!
//! Places build artifacts into per-architecture buckets under the repository
//! root and keeps each bucket's index current.
//!
//! # Repository Layout
//!
//! ```text
//! {repo_dir}/
//! ├── x86_64/
//! │   ├── beyondaur.db.tar.gz
//! │   └── libx-2.0-1-x86_64.pkg.tar.zst
//! └── aarch64/
//!     └── beyondaur.db.tar.gz
//! ```
//!
//! Buckets only ever grow: a file name already present in a bucket is never
//! overwritten, so the first publish of a name wins. Detached signatures
//! (`*.pkg.tar.*.sig`) are copied like packages but never passed to the index
//! tool, which reads them from next to their package.

pub mod arch;
pub mod types;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::lock::{FileLock, LockError};
use crate::process::{Invocation, ToolRunner};

pub use arch::Architecture;
pub use types::{PublishEntry, PublishOutcome, PublishReport};

const SIGNATURE_SUFFIX: &str = ".sig";

#[derive(Debug, Error)]
pub enum PublishError {
  #[error("cannot determine architecture of artifact '{0}'")]
  UnrecognizedArtifact(PathBuf),

  #[error("no repository bucket for architecture '{arch}' (expected directory '{path}')")]
  MissingBucket { arch: String, path: PathBuf },

  #[error("no repository buckets in '{0}' to publish architecture-independent artifacts into")]
  NoBuckets(PathBuf),

  #[error("failed to list repository buckets in '{path}': {source}")]
  ReadRepository {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to lock bucket '{bucket}': {source}")]
  Lock {
    bucket: PathBuf,
    #[source]
    source: LockError,
  },

  #[error("failed to copy '{from}' to '{to}': {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },
}

pub struct Publisher<'a> {
  config: &'a Config,
}

impl<'a> Publisher<'a> {
  pub fn new(config: &'a Config) -> Self {
    Self { config }
  }

  /// Every bucket directory in the repository root, sorted by name.
  ///
  /// Hidden directories are not buckets.
  pub fn buckets(&self) -> Result<Vec<PathBuf>, PublishError> {
    let repo = self.config.repo_dir();
    let read_err = |source| PublishError::ReadRepository {
      path: repo.clone(),
      source,
    };

    let mut buckets = Vec::new();
    for entry in std::fs::read_dir(&repo).map_err(read_err)? {
      let entry = entry.map_err(read_err)?;
      let path = entry.path();
      let hidden = entry.file_name().to_string_lossy().starts_with('.');
      if !hidden && path.is_dir() {
        buckets.push(path);
      }
    }
    buckets.sort();
    Ok(buckets)
  }

  /// Buckets an artifact of `arch` belongs in.
  ///
  /// `any` fans out to every bucket; a concrete architecture names exactly one
  /// bucket, which must already exist.
  pub fn target_buckets(&self, arch: &Architecture) -> Result<Vec<PathBuf>, PublishError> {
    match arch {
      Architecture::Any => {
        let buckets = self.buckets()?;
        if buckets.is_empty() {
          return Err(PublishError::NoBuckets(self.config.repo_dir()));
        }
        Ok(buckets)
      }
      Architecture::Concrete(tag) => {
        let bucket = self.config.repo_dir().join(tag);
        if !bucket.is_dir() {
          return Err(PublishError::MissingBucket {
            arch: tag.clone(),
            path: bucket,
          });
        }
        Ok(vec![bucket])
      }
    }
  }

  /// Publish every artifact, removing each local copy once its buckets are done.
  pub async fn publish<R, I>(&self, runner: &R, artifacts: I) -> Result<PublishReport, PublishError>
  where
    R: ToolRunner,
    I: IntoIterator<Item = PathBuf>,
  {
    let mut report = PublishReport::default();
    self.publish_into(runner, artifacts, &mut report).await?;
    Ok(report)
  }

  /// Like [`Publisher::publish`], recording into `report` as it goes.
  ///
  /// When an artifact cannot be placed, `report` still holds every entry
  /// completed before it.
  pub async fn publish_into<R, I>(
    &self,
    runner: &R,
    artifacts: I,
    report: &mut PublishReport,
  ) -> Result<(), PublishError>
  where
    R: ToolRunner,
    I: IntoIterator<Item = PathBuf>,
  {
    for artifact in artifacts {
      self.publish_one(runner, &artifact, report).await?;
    }

    info!(
      added = report.added(),
      skipped = report.skipped(),
      index_failed = report.failed(),
      "publish complete"
    );
    Ok(())
  }

  async fn publish_one<R: ToolRunner>(
    &self,
    runner: &R,
    artifact: &Path,
    report: &mut PublishReport,
  ) -> Result<(), PublishError> {
    let arch =
      Architecture::of_artifact(artifact).ok_or_else(|| PublishError::UnrecognizedArtifact(artifact.to_path_buf()))?;
    let name = artifact
      .file_name()
      .ok_or_else(|| PublishError::UnrecognizedArtifact(artifact.to_path_buf()))?;

    for bucket in self.target_buckets(&arch)? {
      let outcome = self.place(runner, artifact, &bucket.join(name), &bucket).await?;
      report.entries.push(PublishEntry {
        artifact: name.to_string_lossy().into_owned(),
        architecture: arch.clone(),
        bucket,
        outcome,
      });
    }

    if let Err(e) = std::fs::remove_file(artifact) {
      warn!(path = %artifact.display(), error = %e, "failed to remove local artifact");
    }
    Ok(())
  }

  /// Copy `artifact` to `dest` in `bucket` and index it, unless `dest` exists.
  async fn place<R: ToolRunner>(
    &self,
    runner: &R,
    artifact: &Path,
    dest: &Path,
    bucket: &Path,
  ) -> Result<PublishOutcome, PublishError> {
    let bucket_name = bucket.file_name().unwrap_or_default().to_string_lossy();
    let lock_path = self.config.lock_dir().join(format!("bucket-{}.lock", bucket_name));
    let _lock = FileLock::acquire_async(lock_path, format!("publish {}", artifact.display()))
      .await
      .map_err(|source| PublishError::Lock {
        bucket: bucket.to_path_buf(),
        source,
      })?;

    if dest.exists() {
      debug!(dest = %dest.display(), "artifact already exists in bucket");
      return Ok(PublishOutcome::AlreadyExists);
    }

    copy_atomically(artifact, dest)?;
    info!(dest = %dest.display(), "artifact copied");

    if is_signature(dest) {
      return Ok(PublishOutcome::Added);
    }

    let index = bucket.join(self.config.index_filename());
    let invocation = Invocation::new(&self.config.settings.tools.repo_add).arg(&index).arg(dest);
    match runner.run_checked(&invocation).await {
      Ok(_) => Ok(PublishOutcome::Added),
      Err(e) => {
        warn!(index = %index.display(), error = %e, "index update failed");
        Ok(PublishOutcome::IndexFailed(e.to_string()))
      }
    }
  }
}

fn is_signature(path: &Path) -> bool {
  path
    .file_name()
    .is_some_and(|name| name.to_string_lossy().ends_with(SIGNATURE_SUFFIX))
}

/// Copy to a hidden sibling, then rename into place.
///
/// An interrupted copy never leaves a truncated file under the final name,
/// which would otherwise be skipped as already published on the next run.
fn copy_atomically(from: &Path, to: &Path) -> Result<(), PublishError> {
  let copy_err = |source| PublishError::Copy {
    from: from.to_path_buf(),
    to: to.to_path_buf(),
    source,
  };

  let file_name = to.file_name().unwrap_or_default().to_string_lossy();
  let partial = to.with_file_name(format!(".{}.partial", file_name));

  std::fs::copy(from, &partial).map_err(copy_err)?;
  if let Err(e) = std::fs::rename(&partial, to) {
    let _ = std::fs::remove_file(&partial);
    return Err(copy_err(e));
  }
  Ok(())
}
