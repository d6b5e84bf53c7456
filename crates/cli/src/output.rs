//! Terminal output for the publish report.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

const MOVED: &str = "✓";
const FAILED: &str = "✗";
const DEGRADED: &str = "⚠";
const PRESENT: &str = "•";

/// Rounded to what is useful for a build that takes seconds to minutes.
pub fn format_duration(duration: Duration) -> String {
  match duration.as_secs() {
    secs @ 60.. => format!("{}m {}s", secs / 60, secs % 60),
    0 => format!("{}ms", duration.subsec_millis()),
    secs => format!("{}.{:02}s", secs, duration.subsec_millis() / 10),
  }
}

/// An artifact that was moved into a bucket.
pub fn print_success(message: &str) {
  println!("{} {}", MOVED.if_supports_color(Stream::Stdout, |s| s.green()), message);
}

/// An artifact that was already present.
pub fn print_info(message: &str) {
  println!("{} {}", PRESENT.if_supports_color(Stream::Stdout, |s| s.blue()), message);
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    DEGRADED.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    FAILED.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize report to JSON")?;
  println!("{}", json);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn durations_by_magnitude() {
    assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    assert_eq!(format_duration(Duration::from_secs(3600)), "60m 0s");
  }

  #[test]
  fn json_is_only_json() {
    assert!(OutputFormat::Json.is_json());
    assert!(!OutputFormat::Text.is_json());
  }
}
