use std::fmt;
use std::path::Path;

use serde::{Serialize, Serializer};

/// Tag marking an artifact as architecture-independent.
pub const ANY: &str = "any";

/// Architecture embedded in an artifact file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Architecture {
  /// Architecture-independent; published to every bucket.
  Any,
  /// A concrete architecture naming exactly one bucket.
  Concrete(String),
}

impl Architecture {
  /// Extract the architecture from a name of the form
  /// `<name>-<version>-<arch>.pkg.tar.<compression>`.
  ///
  /// Takes the text after the last `-` before the last `.pkg`. Returns `None`
  /// when the name has no `.pkg` section or the tag cannot name a bucket
  /// directory (empty, hidden, or containing a path separator).
  pub fn from_file_name(name: &str) -> Option<Self> {
    let front = &name[..name.rfind(".pkg")?];
    let tag = match front.rfind('-') {
      Some(idx) => &front[idx + 1..],
      None => front,
    };

    match tag {
      ANY => Some(Self::Any),
      _ if is_bucket_name(tag) => Some(Self::Concrete(tag.to_string())),
      _ => None,
    }
  }

  pub fn of_artifact(path: &Path) -> Option<Self> {
    Self::from_file_name(&path.file_name()?.to_string_lossy())
  }

  pub fn as_str(&self) -> &str {
    match self {
      Self::Any => ANY,
      Self::Concrete(tag) => tag,
    }
  }
}

/// A tag names a bucket only if joining it onto the repository root stays
/// one level below it and does not land on a hidden directory.
fn is_bucket_name(tag: &str) -> bool {
  !tag.is_empty() && !tag.starts_with('.') && !tag.contains(['/', '\\'])
}

impl fmt::Display for Architecture {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl Serialize for Architecture {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn concrete_architecture_extracted() {
    assert_eq!(
      Architecture::from_file_name("foo-1.2-3-x86_64.pkg.tar.zst"),
      Some(Architecture::Concrete("x86_64".to_string()))
    );
    assert_eq!(
      Architecture::from_file_name("libx-2.0-1-aarch64.pkg.tar.xz"),
      Some(Architecture::Concrete("aarch64".to_string()))
    );
  }

  #[test]
  fn any_is_wildcard() {
    assert_eq!(Architecture::from_file_name("foo-1.2-3-any.pkg.tar.xz"), Some(Architecture::Any));
  }

  #[test]
  fn dashed_package_names_use_last_dash() {
    assert_eq!(
      Architecture::from_file_name("python-foo-bar-1:2.0.r3.gabc-1-x86_64.pkg.tar.zst"),
      Some(Architecture::Concrete("x86_64".to_string()))
    );
  }

  #[test]
  fn signature_files_share_the_artifact_architecture() {
    assert_eq!(
      Architecture::from_file_name("foo-1.2-3-any.pkg.tar.zst.sig"),
      Some(Architecture::Any)
    );
  }

  #[test]
  fn names_without_pkg_section_are_rejected() {
    assert_eq!(Architecture::from_file_name("foo-1.2-3-x86_64.tar.zst"), None);
    assert_eq!(Architecture::from_file_name("foo-.pkg.tar.zst"), None);
  }

  #[test]
  fn tags_that_are_not_directory_names_are_rejected() {
    for name in [
      "evil-1-...pkg.tar.zst",
      "evil-1-..pkg.tar.zst",
      "evil-1-.git.pkg.tar.zst",
      "evil-1-a\\b.pkg.tar.zst",
    ] {
      assert_eq!(Architecture::from_file_name(name), None, "{name}");
    }
  }

  #[test]
  fn of_artifact_uses_file_name_only() {
    let path = Path::new("/tmp/pb-x/dir-with-dash/foo-1-1-armv7h.pkg.tar.zst");
    assert_eq!(Architecture::of_artifact(path).unwrap().as_str(), "armv7h");
  }
}
