//! Chrooted package builds.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::process::{Invocation, ToolError, ToolRunner};
use crate::sandbox::{Sandbox, SandboxError};

/// Substring every package artifact name contains (`*.pkg.tar.*`).
const ARTIFACT_MARKER: &str = ".pkg.tar.";

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("recipe tree '{0}' does not exist")]
  MissingRecipe(PathBuf),

  #[error(transparent)]
  Sandbox(#[from] SandboxError),

  #[error("package build failed: {0}")]
  Build(#[source] ToolError),
}

impl BuildError {
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      BuildError::Sandbox(e) => e.exit_code(),
      BuildError::Build(e) => e.exit_code(),
      BuildError::MissingRecipe(_) => None,
    }
  }
}

/// Runs builds inside a freshly refreshed sandbox.
pub struct Builder<'a> {
  config: &'a Config,
  sandbox: Sandbox<'a>,
}

impl<'a> Builder<'a> {
  pub fn new(config: &'a Config) -> Self {
    Self {
      config,
      sandbox: Sandbox::new(config),
    }
  }

  /// Provision if needed, refresh every root, then build the recipe in `recipe_dir`.
  ///
  /// On success returns the artifacts left in the recipe tree. Nothing is
  /// returned from a failed build.
  pub async fn build<R: ToolRunner>(&mut self, runner: &R, recipe_dir: &Path) -> Result<Artifacts, BuildError> {
    if !recipe_dir.is_dir() {
      return Err(BuildError::MissingRecipe(recipe_dir.to_path_buf()));
    }

    self.sandbox.ensure_provisioned(runner).await?;
    self.sandbox.refresh(runner).await?;

    info!(recipe = %recipe_dir.display(), "building package");
    let invocation = Invocation::new(&self.config.settings.tools.makechrootpkg)
      .arg("-r")
      .arg(self.config.sandbox_dir())
      .current_dir(recipe_dir);
    runner.run_checked(&invocation).await.map_err(BuildError::Build)?;

    Ok(Artifacts::in_dir(recipe_dir))
  }
}

/// Lazy, single-pass enumeration of package artifacts in a directory.
///
/// Yields files directly inside the directory whose names match `*.pkg.tar.*`,
/// in filesystem order.
pub struct Artifacts {
  inner: walkdir::IntoIter,
}

impl Artifacts {
  pub fn in_dir(dir: &Path) -> Self {
    Self {
      inner: WalkDir::new(dir).min_depth(1).max_depth(1).into_iter(),
    }
  }
}

impl Iterator for Artifacts {
  type Item = PathBuf;

  fn next(&mut self) -> Option<PathBuf> {
    loop {
      match self.inner.next()? {
        Ok(entry) if entry.file_type().is_file() && is_artifact_name(entry.file_name()) => {
          return Some(entry.into_path());
        }
        Ok(_) => continue,
        Err(e) => warn!(error = %e, "skipping unreadable entry"),
      }
    }
  }
}

pub fn is_artifact_name(name: &OsStr) -> bool {
  name.to_string_lossy().contains(ARTIFACT_MARKER)
}
