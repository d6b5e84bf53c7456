//! Recipe source resolution and cloning.
//!
//! A package identifier is either a bare name, expanded against the default
//! host and namespace, or anything containing `/`, used verbatim as the clone
//! URL.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::config::{Settings, Tools};
use crate::process::{Invocation, ToolError, ToolRunner};

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("package identifier must not be empty")]
  EmptyIdentifier,

  #[error("invalid recipe destination '{0}'")]
  InvalidDestination(PathBuf),

  #[error("failed to clone recipe from {url}: {source}")]
  Clone {
    url: String,
    #[source]
    source: ToolError,
  },

  #[error("clone of {url} reported success but '{path}' does not exist")]
  MissingCheckout { url: String, path: PathBuf },
}

impl FetchError {
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      FetchError::Clone { source, .. } => source.exit_code(),
      _ => None,
    }
  }
}

/// Where a package's recipe comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
  identifier: String,
  url: String,
}

impl PackageSource {
  pub fn parse(identifier: &str, settings: &Settings) -> Result<Self, FetchError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
      return Err(FetchError::EmptyIdentifier);
    }

    let url = if identifier.contains('/') {
      identifier.to_string()
    } else {
      format!(
        "https://{}/{}/{}.git",
        settings.default_host, settings.default_namespace, identifier
      )
    };

    Ok(Self {
      identifier: identifier.to_string(),
      url,
    })
  }

  pub fn identifier(&self) -> &str {
    &self.identifier
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Clone the recipe into `destination`, which must not exist yet.
  pub async fn fetch<R: ToolRunner>(&self, runner: &R, tools: &Tools, destination: &Path) -> Result<(), FetchError> {
    let (Some(parent), Some(name)) = (destination.parent(), destination.file_name()) else {
      return Err(FetchError::InvalidDestination(destination.to_path_buf()));
    };

    info!(url = %self.url, dest = %destination.display(), "cloning recipe");

    let invocation = Invocation::new(&tools.git)
      .arg("clone")
      .arg(&self.url)
      .arg(name)
      .current_dir(parent);
    runner.run_checked(&invocation).await.map_err(|source| FetchError::Clone {
      url: self.url.clone(),
      source,
    })?;

    if !destination.is_dir() {
      return Err(FetchError::MissingCheckout {
        url: self.url.clone(),
        path: destination.to_path_buf(),
      });
    }

    Ok(())
  }
}
