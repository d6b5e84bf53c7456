//! The build-and-publish pipeline.
//!
//! workspace -> fetch -> provision + refresh -> build -> publish. Any fatal
//! error stops the run; the workspace is removed on every exit path.

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::build::{BuildError, Builder};
use crate::config::Config;
use crate::fetch::{FetchError, PackageSource};
use crate::process::ToolRunner;
use crate::publish::{PublishError, PublishReport, Publisher};
use crate::workspace::{Workspace, WorkspaceError};

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Workspace(#[from] WorkspaceError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Build(#[from] BuildError),

  /// Publishing stopped; `partial` holds the entries completed before the error.
  #[error("{error}")]
  Publish { error: PublishError, partial: PublishReport },
}

impl PipelineError {
  /// Exit code of the external tool that caused the failure, if any.
  pub fn exit_code(&self) -> Option<i32> {
    match self {
      PipelineError::Fetch(e) => e.exit_code(),
      PipelineError::Build(e) => e.exit_code(),
      PipelineError::Workspace(_) | PipelineError::Publish { .. } => None,
    }
  }
}

/// Result of a completed run.
#[derive(Debug, Serialize)]
pub struct PipelineReport {
  pub identifier: String,
  pub source_url: String,
  pub publish: PublishReport,
}

pub struct Pipeline<'a, R> {
  config: &'a Config,
  runner: R,
}

impl<'a, R: ToolRunner> Pipeline<'a, R> {
  pub fn new(config: &'a Config, runner: R) -> Self {
    Self { config, runner }
  }

  pub fn runner(&self) -> &R {
    &self.runner
  }

  /// Build the package named by `identifier` and publish its artifacts.
  pub async fn run(&self, identifier: &str) -> Result<PipelineReport, PipelineError> {
    let source = PackageSource::parse(identifier, &self.config.settings)?;
    let workspace = Workspace::acquire(self.config)?;
    info!(package = source.identifier(), url = source.url(), "starting pipeline");

    source
      .fetch(&self.runner, &self.config.settings.tools, workspace.recipe_dir())
      .await?;

    let artifacts = Builder::new(self.config)
      .build(&self.runner, workspace.recipe_dir())
      .await?;

    let mut publish = PublishReport::default();
    if let Err(error) = Publisher::new(self.config)
      .publish_into(&self.runner, artifacts, &mut publish)
      .await
    {
      return Err(PipelineError::Publish {
        error,
        partial: publish,
      });
    }

    workspace.close();

    Ok(PipelineReport {
      identifier: source.identifier().to_string(),
      source_url: source.url().to_string(),
      publish,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::process::ToolOutput;
  use crate::util::testutil::{
    FakeRunner, build_produces, clone_creates_recipe, list_names, make_buckets, mkarchroot_creates_root, test_config,
  };
  use tempfile::TempDir;

  fn workspaces_left(config: &Config) -> Vec<String> {
    if !config.tmp_dir().exists() {
      return vec![];
    }
    list_names(&config.tmp_dir())
      .into_iter()
      .filter(|n| n.starts_with("pb-"))
      .collect()
  }

  fn happy_runner() -> FakeRunner {
    FakeRunner::new()
      .on("git", clone_creates_recipe)
      .on("mkarchroot", mkarchroot_creates_root)
      .on(
        "makechrootpkg",
        build_produces(&["libx-2.0-1-x86_64.pkg.tar.zst", "docs-2.0-1-any.pkg.tar.zst"]),
      )
  }

  fn bucket(config: &Config, arch: &str) -> Vec<String> {
    list_names(&config.repo_dir().join(arch))
  }

  #[tokio::test]
  async fn end_to_end_fans_out_any_and_routes_concrete() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    make_buckets(&config, &["x86_64", "aarch64"]);
    let pipeline = Pipeline::new(&config, happy_runner());

    let report = pipeline.run("my-pkg").await.unwrap();

    assert_eq!(report.source_url, "https://github.com/BeyondAUR/my-pkg.git");
    assert_eq!(report.publish.added(), 3);
    assert_eq!(
      bucket(&config, "x86_64"),
      vec!["docs-2.0-1-any.pkg.tar.zst", "libx-2.0-1-x86_64.pkg.tar.zst"]
    );
    assert_eq!(bucket(&config, "aarch64"), vec!["docs-2.0-1-any.pkg.tar.zst"]);
    assert_eq!(
      pipeline.runner().programs(),
      vec![
        "git",
        "mkarchroot",
        "arch-nspawn",
        "makechrootpkg",
        "repo-add",
        "repo-add",
        "repo-add"
      ]
    );
    assert!(workspaces_left(&config).is_empty());
  }

  #[tokio::test]
  async fn second_run_skips_provisioning_and_publishes_nothing_new() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    make_buckets(&config, &["x86_64", "aarch64"]);

    Pipeline::new(&config, happy_runner()).run("my-pkg").await.unwrap();
    let pipeline = Pipeline::new(&config, happy_runner());
    let report = pipeline.run("my-pkg").await.unwrap();

    assert_eq!(report.publish.added(), 0);
    assert_eq!(report.publish.skipped(), 3);
    assert!(pipeline.runner().calls_to("mkarchroot").is_empty());
    assert_eq!(pipeline.runner().calls_to("arch-nspawn").len(), 1);
    assert!(pipeline.runner().calls_to("repo-add").is_empty());
  }

  #[tokio::test]
  async fn explicit_url_is_cloned_verbatim() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    make_buckets(&config, &["x86_64"]);
    let pipeline = Pipeline::new(&config, happy_runner());

    let report = pipeline.run("https://example.com/x/y.git").await.unwrap();

    assert_eq!(report.source_url, "https://example.com/x/y.git");
    assert_eq!(pipeline.runner().calls_to("git")[0].arg_strings()[1], "https://example.com/x/y.git");
  }

  #[tokio::test]
  async fn fetch_failure_aborts_before_sandbox() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let pipeline = Pipeline::new(&config, FakeRunner::new().failing("git", 128));

    let err = pipeline.run("nope").await.unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(_)));
    assert_eq!(err.exit_code(), Some(128));
    assert_eq!(pipeline.runner().programs(), vec!["git"]);
    assert!(workspaces_left(&config).is_empty());
  }

  #[tokio::test]
  async fn build_failure_publishes_nothing_and_cleans_workspace() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    make_buckets(&config, &["x86_64"]);
    let runner = FakeRunner::new()
      .on("git", clone_creates_recipe)
      .on("makechrootpkg", |inv| {
        let cwd = inv.cwd.clone().unwrap();
        std::fs::write(cwd.join("half-1-1-x86_64.pkg.tar.zst"), "partial").unwrap();
        ToolOutput::failure(2, "==> ERROR: A failure occurred in build().")
      });
    let pipeline = Pipeline::new(&config, runner);

    let err = pipeline.run("my-pkg").await.unwrap_err();

    assert!(matches!(err, PipelineError::Build(BuildError::Build(_))));
    assert_eq!(err.exit_code(), Some(2));
    assert!(err.to_string().contains("A failure occurred in build()"));
    assert!(pipeline.runner().calls_to("repo-add").is_empty());
    assert!(bucket(&config, "x86_64").is_empty());
    assert!(workspaces_left(&config).is_empty());
  }

  #[tokio::test]
  async fn provisioning_failure_is_fatal() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    let runner = FakeRunner::new()
      .on("git", clone_creates_recipe)
      .failing("mkarchroot", 1);
    let pipeline = Pipeline::new(&config, runner);

    let err = pipeline.run("my-pkg").await.unwrap_err();

    assert_eq!(err.exit_code(), Some(1));
    assert_eq!(pipeline.runner().programs(), vec!["git", "mkarchroot"]);
    assert!(!config.marker_path().exists());
  }

  #[tokio::test]
  async fn missing_bucket_keeps_what_was_already_published() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    make_buckets(&config, &["x86_64"]);
    let runner = FakeRunner::new()
      .on("git", clone_creates_recipe)
      .on("mkarchroot", mkarchroot_creates_root)
      .on(
        "makechrootpkg",
        build_produces(&["docs-2.0-1-any.pkg.tar.zst", "libx-2.0-1-riscv64.pkg.tar.zst"]),
      );
    let pipeline = Pipeline::new(&config, runner);

    let err = pipeline.run("my-pkg").await.unwrap_err();

    match err {
      PipelineError::Publish {
        error: PublishError::MissingBucket { arch, .. },
        partial,
      } => {
        assert_eq!(arch, "riscv64");
        // Enumeration order decides whether docs was reached first.
        assert_eq!(partial.added(), bucket(&config, "x86_64").len());
      }
      other => panic!("expected missing bucket, got {other:?}"),
    }
    assert!(workspaces_left(&config).is_empty());
  }
}
