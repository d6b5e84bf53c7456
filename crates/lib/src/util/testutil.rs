//! Test utilities for pkgpress-lib.
//!
//! [`FakeRunner`] stands in for the external tools: it records every
//! invocation and lets a test script each program's exit status and side
//! effects on the filesystem.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::{Config, Settings};
use crate::process::{Invocation, ToolError, ToolOutput, ToolRunner};

type Handler = Box<dyn Fn(&Invocation) -> ToolOutput + Send + Sync>;

/// Records invocations and answers them with scripted results.
///
/// Programs without a handler succeed with no output.
#[derive(Default)]
pub struct FakeRunner {
  calls: Mutex<Vec<Invocation>>,
  handlers: Vec<(String, Handler)>,
}

impl FakeRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Answer calls to `program` with `handler`.
  pub fn on<F>(mut self, program: &str, handler: F) -> Self
  where
    F: Fn(&Invocation) -> ToolOutput + Send + Sync + 'static,
  {
    self.handlers.push((program.to_string(), Box::new(handler)));
    self
  }

  /// Make every call to `program` exit with `code`.
  pub fn failing(self, program: &str, code: i32) -> Self {
    let message = format!("{program}: simulated failure");
    self.on(program, move |_| ToolOutput::failure(code, message.clone()))
  }

  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().unwrap().clone()
  }

  pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
    self
      .calls()
      .into_iter()
      .filter(|inv| inv.program_name() == program)
      .collect()
  }

  /// Program names in call order.
  pub fn programs(&self) -> Vec<String> {
    self.calls().iter().map(Invocation::program_name).collect()
  }
}

impl ToolRunner for FakeRunner {
  async fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
    self.calls.lock().unwrap().push(invocation.clone());

    let program = invocation.program_name();
    let output = self
      .handlers
      .iter()
      .find(|(name, _)| *name == program)
      .map(|(_, handler)| handler(invocation))
      .unwrap_or_else(ToolOutput::success);
    Ok(output)
  }
}

/// Handler for `git clone <url> <name>` that creates the destination tree.
pub fn clone_creates_recipe(invocation: &Invocation) -> ToolOutput {
  let cwd = invocation.cwd.clone().expect("clone runs in the destination parent");
  let name = invocation.args.last().expect("clone has a destination").clone();
  let dest = cwd.join(name);
  std::fs::create_dir_all(&dest).unwrap();
  std::fs::write(dest.join("PKGBUILD"), "pkgname=test\n").unwrap();
  ToolOutput::success()
}

/// Handler for `makechrootpkg` that drops the given artifacts into its cwd.
pub fn build_produces(artifacts: &'static [&'static str]) -> impl Fn(&Invocation) -> ToolOutput + Send + Sync {
  move |invocation| {
    let cwd = invocation.cwd.clone().expect("build runs in the recipe tree");
    for name in artifacts {
      write_file(&cwd.join(name), name);
    }
    ToolOutput::success()
  }
}

/// Handler for `mkarchroot` that creates the base root directory it is given.
pub fn mkarchroot_creates_root(invocation: &Invocation) -> ToolOutput {
  // mkarchroot -C <pacman.conf> -M <makepkg.conf> <root> <packages...>
  let root = PathBuf::from(&invocation.args[4]);
  std::fs::create_dir_all(root).unwrap();
  ToolOutput::success()
}

pub fn write_file(path: &Path, contents: &str) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, contents).unwrap();
}

/// A configuration rooted at `root` with default settings.
pub fn test_config(root: &Path) -> Config {
  Config::new(root, Settings::default()).unwrap()
}

/// Create empty bucket directories under the repository root.
pub fn make_buckets(config: &Config, arches: &[&str]) {
  for arch in arches {
    std::fs::create_dir_all(config.repo_dir().join(arch)).unwrap();
  }
}

/// Sorted file names directly inside `dir`.
pub fn list_names(dir: &Path) -> Vec<String> {
  let mut names: Vec<String> = std::fs::read_dir(dir)
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}
