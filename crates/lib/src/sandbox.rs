//! Chroot provisioning and refresh.
//!
//! The sandbox-root collection holds one canonical base root plus any other
//! roots created next to it. The base root is created once, gated by a marker
//! file; every root in the collection is upgraded before each build.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::lock::{FileLock, LockError, unix_now};
use crate::process::{Invocation, ToolError, ToolRunner};

const MARKER_VERSION: u32 = 1;
const PROVISION_LOCK: &str = "provision.lock";

#[derive(Debug, Error)]
pub enum SandboxError {
  #[error("failed to create sandbox directory '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to lock sandbox provisioning: {0}")]
  Lock(#[from] LockError),

  #[error("failed to provision base sandbox root '{root}': {source}")]
  Provision {
    root: PathBuf,
    #[source]
    source: ToolError,
  },

  #[error("failed to write provisioning marker '{path}': {source}")]
  WriteMarker {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to list sandbox roots in '{path}': {source}")]
  ReadCollection {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to refresh sandbox root '{root}': {source}")]
  Refresh {
    root: PathBuf,
    #[source]
    source: ToolError,
  },
}

impl SandboxError {
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      SandboxError::Provision { source, .. } | SandboxError::Refresh { source, .. } => source.exit_code(),
      _ => None,
    }
  }
}

/// Contents of the provisioning marker. Only its presence is significant.
#[derive(Debug, Serialize, Deserialize)]
pub struct SandboxMarker {
  pub version: u32,
  pub initialized_at_unix: u64,
  pub root: PathBuf,
  pub packages: Vec<String>,
}

/// Outcome of [`Sandbox::ensure_provisioned`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioning {
  AlreadyProvisioned,
  Provisioned,
}

pub struct Sandbox<'a> {
  config: &'a Config,
  provisioned: bool,
}

impl<'a> Sandbox<'a> {
  pub fn new(config: &'a Config) -> Self {
    Self {
      config,
      provisioned: false,
    }
  }

  /// Whether the provisioning marker is present on disk.
  pub fn is_provisioned(&self) -> bool {
    self.config.marker_path().is_file()
  }

  /// Create the base root unless the marker says it already exists.
  ///
  /// Holds the provisioning lock while checking and creating, so a concurrent
  /// run waits and then sees the marker instead of provisioning again.
  pub async fn ensure_provisioned<R: ToolRunner>(&mut self, runner: &R) -> Result<Provisioning, SandboxError> {
    if self.provisioned || self.is_provisioned() {
      self.provisioned = true;
      return Ok(Provisioning::AlreadyProvisioned);
    }

    let _lock = FileLock::acquire_async(self.config.lock_dir().join(PROVISION_LOCK), "provision".to_string()).await?;
    if self.is_provisioned() {
      debug!("sandbox provisioned by another run");
      self.provisioned = true;
      return Ok(Provisioning::AlreadyProvisioned);
    }

    let collection = self.config.sandbox_dir();
    std::fs::create_dir_all(&collection).map_err(|source| SandboxError::CreateDir {
      path: collection.clone(),
      source,
    })?;

    let root = self.config.base_root();
    info!(root = %root.display(), "provisioning base sandbox root");

    let packages = &self.config.settings.essential_packages;
    let invocation = Invocation::new(&self.config.settings.tools.mkarchroot)
      .arg("-C")
      .arg(self.config.pacman_conf())
      .arg("-M")
      .arg(self.config.makepkg_conf())
      .arg(&root)
      .args(packages)
      .current_dir(&collection);
    runner
      .run_checked(&invocation)
      .await
      .map_err(|source| SandboxError::Provision {
        root: root.clone(),
        source,
      })?;

    self.write_marker(root)?;
    self.provisioned = true;
    Ok(Provisioning::Provisioned)
  }

  fn write_marker(&self, root: PathBuf) -> Result<(), SandboxError> {
    let path = self.config.marker_path();
    let marker = SandboxMarker {
      version: MARKER_VERSION,
      initialized_at_unix: unix_now(),
      root,
      packages: self.config.settings.essential_packages.clone(),
    };
    let content = serde_json::to_string_pretty(&marker).map_err(|e| SandboxError::WriteMarker {
      path: path.clone(),
      source: io::Error::other(e),
    })?;
    std::fs::write(&path, format!("{}\n", content)).map_err(|source| SandboxError::WriteMarker { path, source })
  }

  /// Every directory in the sandbox-root collection, sorted by name.
  pub fn roots(&self) -> Result<Vec<PathBuf>, SandboxError> {
    let collection = self.config.sandbox_dir();
    let read_err = |source| SandboxError::ReadCollection {
      path: collection.clone(),
      source,
    };

    let mut roots = Vec::new();
    for entry in std::fs::read_dir(&collection).map_err(read_err)? {
      let path = entry.map_err(read_err)?.path();
      if path.is_dir() {
        roots.push(path);
      }
    }
    roots.sort();
    Ok(roots)
  }

  /// Upgrade every sandbox root and reinstall the essential packages.
  ///
  /// Stops at the first root that fails; the build must not run on a stale root.
  pub async fn refresh<R: ToolRunner>(&self, runner: &R) -> Result<Vec<PathBuf>, SandboxError> {
    let roots = self.roots()?;
    let packages = &self.config.settings.essential_packages;

    for root in &roots {
      info!(root = %root.display(), "refreshing sandbox root");
      let invocation = Invocation::new(&self.config.settings.tools.arch_nspawn)
        .arg("-C")
        .arg(self.config.pacman_conf())
        .arg("-M")
        .arg(self.config.makepkg_conf())
        .arg(root)
        .args(["pacman", "--noconfirm", "-Syu"])
        .args(packages);
      runner
        .run_checked(&invocation)
        .await
        .map_err(|source| SandboxError::Refresh {
          root: root.clone(),
          source,
        })?;
    }

    Ok(roots)
  }
}
