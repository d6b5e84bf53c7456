//! Runtime configuration.
//!
//! All filesystem locations are derived from a single install root:
//!
//! ```text
//! {root}/
//! ├── tmp/                    # per-run workspaces, plus tmp/locks/
//! ├── nspawn/                 # sandbox-root collection
//! │   ├── root/               # canonical base root
//! │   └── initialized.json    # provisioning marker
//! ├── config/
//! │   ├── makepkg.conf
//! │   ├── pacman.conf
//! │   └── pkgpress.toml       # optional settings
//! └── pkgs/                   # repository root, one bucket per architecture
//! ```

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::{ROOT_ENV_VAR, SETTINGS_FILENAME};

const TMP_DIR: &str = "tmp";
const LOCKS_DIR: &str = "locks";
const SANDBOX_DIR: &str = "nspawn";
const BASE_ROOT_NAME: &str = "root";
const MARKER_FILENAME: &str = "initialized.json";
const CONFIG_DIR: &str = "config";
const MAKEPKG_CONF: &str = "makepkg.conf";
const PACMAN_CONF: &str = "pacman.conf";
const REPO_DIR: &str = "pkgs";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to determine install root: {0}")]
  InstallRoot(#[source] io::Error),

  #[error("failed to read settings file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse settings file '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: Box<toml::de::Error>,
  },

  #[error("essential package list must not be empty")]
  NoEssentialPackages,
}

/// Program names for the external collaborators.
///
/// Each may be a bare name looked up on `PATH` or an absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tools {
  pub git: String,
  pub mkarchroot: String,
  pub arch_nspawn: String,
  pub makechrootpkg: String,
  pub repo_add: String,
}

impl Default for Tools {
  fn default() -> Self {
    Self {
      git: "git".to_string(),
      mkarchroot: "mkarchroot".to_string(),
      arch_nspawn: "arch-nspawn".to_string(),
      makechrootpkg: "makechrootpkg".to_string(),
      repo_add: "repo-add".to_string(),
    }
  }
}

/// Tunable settings read from `config/pkgpress.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
  /// Host used to expand bare package names into clone URLs.
  pub default_host: String,
  /// Namespace (organisation) under `default_host`.
  pub default_namespace: String,
  /// Repository name; every bucket's index is `<repo_name>.db.tar.gz`.
  pub repo_name: String,
  /// Packages installed into every sandbox root, in order.
  pub essential_packages: Vec<String>,
  pub tools: Tools,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      default_host: "github.com".to_string(),
      default_namespace: "BeyondAUR".to_string(),
      repo_name: "beyondaur".to_string(),
      essential_packages: ["hx-ghcup-hs", "rustup", "git", "cmake", "rsync", "base-devel"]
        .into_iter()
        .map(String::from)
        .collect(),
      tools: Tools::default(),
    }
  }
}

/// Configuration passed explicitly into every pipeline component.
#[derive(Debug, Clone)]
pub struct Config {
  root: PathBuf,
  pub settings: Settings,
}

impl Config {
  /// Build a configuration from explicit parts.
  pub fn new(root: impl Into<PathBuf>, settings: Settings) -> Result<Self, ConfigError> {
    if settings.essential_packages.is_empty() {
      return Err(ConfigError::NoEssentialPackages);
    }
    Ok(Self {
      root: root.into(),
      settings,
    })
  }

  /// Load the configuration for `root`, reading the settings file if present.
  pub fn load(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
    let root = root.into();
    let root = dunce::canonicalize(&root).unwrap_or(root);
    let path = root.join(CONFIG_DIR).join(SETTINGS_FILENAME);

    let settings = match std::fs::read_to_string(&path) {
      Ok(content) => {
        debug!(path = %path.display(), "loading settings");
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
          path: path.clone(),
          source: Box::new(e),
        })?
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Settings::default(),
      Err(source) => return Err(ConfigError::Read { path, source }),
    };

    Self::new(root, settings)
  }

  /// Load the configuration for the install root named by the environment.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::load(install_root()?)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Parent directory of every per-run workspace.
  pub fn tmp_dir(&self) -> PathBuf {
    self.root.join(TMP_DIR)
  }

  /// Directory holding advisory lock files.
  pub fn lock_dir(&self) -> PathBuf {
    self.tmp_dir().join(LOCKS_DIR)
  }

  /// The sandbox-root collection.
  pub fn sandbox_dir(&self) -> PathBuf {
    self.root.join(SANDBOX_DIR)
  }

  /// The canonical base sandbox root.
  pub fn base_root(&self) -> PathBuf {
    self.sandbox_dir().join(BASE_ROOT_NAME)
  }

  pub fn marker_path(&self) -> PathBuf {
    self.sandbox_dir().join(MARKER_FILENAME)
  }

  pub fn config_dir(&self) -> PathBuf {
    self.root.join(CONFIG_DIR)
  }

  pub fn makepkg_conf(&self) -> PathBuf {
    self.config_dir().join(MAKEPKG_CONF)
  }

  pub fn pacman_conf(&self) -> PathBuf {
    self.config_dir().join(PACMAN_CONF)
  }

  /// The repository root containing one bucket per architecture.
  pub fn repo_dir(&self) -> PathBuf {
    self.root.join(REPO_DIR)
  }

  /// File name of the index inside every bucket.
  pub fn index_filename(&self) -> String {
    format!("{}.db.tar.gz", self.settings.repo_name)
  }
}

/// Returns the install root: `PKGPRESS_ROOT` if set, else the working directory.
pub fn install_root() -> Result<PathBuf, ConfigError> {
  if let Ok(path) = std::env::var(ROOT_ENV_VAR)
    && !path.is_empty()
  {
    return Ok(PathBuf::from(path));
  }

  std::env::current_dir().map_err(ConfigError::InstallRoot)
}
