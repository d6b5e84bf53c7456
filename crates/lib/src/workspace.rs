//! Per-run scratch directories.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

/// Prefix of every workspace directory under the tmp root.
const WORKSPACE_PREFIX: &str = "pb-";

/// Name of the recipe tree inside a workspace.
const RECIPE_DIR: &str = "pkgbuild_code";

#[derive(Debug, Error)]
pub enum WorkspaceError {
  #[error("failed to create workspace root '{path}': {source}")]
  CreateRoot {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to create workspace under '{path}': {source}")]
  Create {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A uniquely named directory owned by one pipeline run.
///
/// The directory and everything in it is removed when the workspace is
/// dropped, on success and failure alike. Removal is best-effort.
#[derive(Debug)]
pub struct Workspace {
  dir: TempDir,
  recipe_dir: PathBuf,
}

impl Workspace {
  pub fn acquire(config: &Config) -> Result<Self, WorkspaceError> {
    let root = config.tmp_dir();
    std::fs::create_dir_all(&root).map_err(|source| WorkspaceError::CreateRoot {
      path: root.clone(),
      source,
    })?;

    let dir = tempfile::Builder::new()
      .prefix(WORKSPACE_PREFIX)
      .tempdir_in(&root)
      .map_err(|source| WorkspaceError::Create { path: root, source })?;
    let recipe_dir = dir.path().join(RECIPE_DIR);

    debug!(path = %dir.path().display(), "workspace acquired");
    Ok(Self { dir, recipe_dir })
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  /// Where the recipe tree is materialized. Not created by the workspace.
  pub fn recipe_dir(&self) -> &Path {
    &self.recipe_dir
  }

  /// Remove the workspace now, logging rather than failing if removal is incomplete.
  pub fn close(self) {
    let path = self.dir.path().to_path_buf();
    match self.dir.close() {
      Ok(()) => debug!(path = %path.display(), "workspace removed"),
      Err(e) => warn!(path = %path.display(), error = %e, "failed to remove workspace"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Settings;

  fn config_in(root: &Path) -> Config {
    Config::new(root, Settings::default()).unwrap()
  }

  #[test]
  fn acquire_creates_unique_directory_under_tmp() {
    let temp = TempDir::new().unwrap();
    let config = config_in(temp.path());

    let a = Workspace::acquire(&config).unwrap();
    let b = Workspace::acquire(&config).unwrap();

    assert_ne!(a.path(), b.path());
    for ws in [&a, &b] {
      assert!(ws.path().is_dir());
      assert_eq!(ws.path().parent().unwrap(), config.tmp_dir());
      let name = ws.path().file_name().unwrap().to_string_lossy().into_owned();
      assert!(name.starts_with(WORKSPACE_PREFIX));
    }
  }

  #[test]
  fn recipe_dir_is_not_created() {
    let temp = TempDir::new().unwrap();
    let ws = Workspace::acquire(&config_in(temp.path())).unwrap();

    assert_eq!(ws.recipe_dir(), ws.path().join(RECIPE_DIR));
    assert!(!ws.recipe_dir().exists());
  }

  #[test]
  fn drop_removes_directory() {
    let temp = TempDir::new().unwrap();
    let ws = Workspace::acquire(&config_in(temp.path())).unwrap();
    std::fs::create_dir_all(ws.recipe_dir()).unwrap();
    std::fs::write(ws.recipe_dir().join("PKGBUILD"), "pkgname=x\n").unwrap();
    let path = ws.path().to_path_buf();

    drop(ws);

    assert!(!path.exists());
  }

  #[test]
  fn close_removes_directory() {
    let temp = TempDir::new().unwrap();
    let ws = Workspace::acquire(&config_in(temp.path())).unwrap();
    let path = ws.path().to_path_buf();

    ws.close();

    assert!(!path.exists());
  }
}
