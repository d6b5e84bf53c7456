//! Implementation of the `pkgpress <PACKAGE>` command.
//!
//! Builds the package recipe in the chroot and publishes the artifacts into
//! the repository buckets.

use std::time::Instant;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use pkgpress_lib::config::Config;
use pkgpress_lib::pipeline::{Pipeline, PipelineError, PipelineReport};
use pkgpress_lib::process::SystemRunner;
use pkgpress_lib::publish::{PublishOutcome, PublishReport};

use crate::output::{
  OutputFormat, format_duration, print_info, print_json, print_stat, print_success, print_warning,
};

/// Execute the build-and-publish pipeline for `package`.
///
/// Returns the process exit code: 0 when every artifact was published or
/// already present, 1 when an index update failed.
pub fn cmd_build(package: &str, output: OutputFormat) -> Result<i32> {
  let start = Instant::now();
  let config = Config::from_env().context("Failed to load configuration")?;

  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")?;
  let pipeline = Pipeline::new(&config, SystemRunner);
  let report = match rt.block_on(pipeline.run(package)) {
    Ok(report) => report,
    Err(err) => {
      if let PipelineError::Publish { partial, .. } = &err
        && !partial.entries.is_empty()
      {
        if output.is_json() {
          print_json(partial)?;
        } else {
          print_entries(partial);
        }
      }
      return Err(anyhow::Error::new(err).context(format!("Failed to build and publish {}", package)));
    }
  };

  if output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
    print_stat("Duration", &format_duration(start.elapsed()));
    println!();
    println!("Now commit and push this git worktree");
  }

  Ok(if report.publish.is_success() { 0 } else { 1 })
}

fn print_report(report: &PipelineReport) {
  print_entries(&report.publish);

  println!();
  print_stat("Package", &report.source_url);
  print_stat("Added", &report.publish.added().to_string());
  print_stat("Already present", &report.publish.skipped().to_string());
  if report.publish.failed() > 0 {
    print_stat("Index failures", &report.publish.failed().to_string());
  }
}

fn print_entries(publish: &PublishReport) {
  for entry in &publish.entries {
    let bucket = entry.bucket_name();
    match &entry.outcome {
      PublishOutcome::Added => print_success(&format!(
        "Move {} {}",
        entry.artifact,
        format!("-> {}", bucket).if_supports_color(Stream::Stdout, |s| s.dimmed())
      )),
      PublishOutcome::AlreadyExists => print_info(&format!("{} already existed in {}", entry.artifact, bucket)),
      PublishOutcome::IndexFailed(message) => print_warning(&format!(
        "{} copied to {} but the index update failed: {}",
        entry.artifact, bucket, message
      )),
    }
  }
}

/// Exit code for a failed run: the failing tool's own code when known, else 1.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
  err
    .chain()
    .find_map(|e| e.downcast_ref::<PipelineError>())
    .and_then(PipelineError::exit_code)
    .filter(|code| *code != 0)
    .unwrap_or(1)
}
