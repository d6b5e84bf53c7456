//! Publish results.

use std::path::PathBuf;

use serde::Serialize;

use super::arch::Architecture;

/// What happened to one artifact in one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum PublishOutcome {
  /// Copied into the bucket and recorded in its index.
  Added,
  /// A file with the same name was already present; the bucket was not touched.
  AlreadyExists,
  /// Copied into the bucket, but the index update failed.
  IndexFailed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishEntry {
  /// Artifact file name.
  pub artifact: String,
  pub architecture: Architecture,
  /// Bucket directory the entry refers to.
  pub bucket: PathBuf,
  pub outcome: PublishOutcome,
}

impl PublishEntry {
  /// Bucket directory name, i.e. the architecture it holds.
  pub fn bucket_name(&self) -> String {
    self
      .bucket
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishReport {
  pub entries: Vec<PublishEntry>,
}

impl PublishReport {
  fn count(&self, pred: impl Fn(&PublishOutcome) -> bool) -> usize {
    self.entries.iter().filter(|e| pred(&e.outcome)).count()
  }

  pub fn added(&self) -> usize {
    self.count(|o| matches!(o, PublishOutcome::Added))
  }

  pub fn skipped(&self) -> usize {
    self.count(|o| matches!(o, PublishOutcome::AlreadyExists))
  }

  pub fn failed(&self) -> usize {
    self.count(|o| matches!(o, PublishOutcome::IndexFailed(_)))
  }

  /// Returns true if no index update failed.
  pub fn is_success(&self) -> bool {
    self.failed() == 0
  }
}
