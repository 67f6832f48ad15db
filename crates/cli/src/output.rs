//! CLI output formatting utilities.
//!
//! Colored status lines, human-readable sizes and durations, and rendering of
//! engine build events.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use plainpack_lib::engine::BuildEvent;

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

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;
  const GB: u64 = MB * 1024;

  if bytes >= GB {
    format!("{:.1} GB", bytes as f64 / GB as f64)
  } else if bytes >= MB {
    format!("{:.1} MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1} KB", bytes as f64 / KB as f64)
  } else {
    format!("{} B", bytes)
  }
}

/// Elapsed time rounded to milliseconds, e.g. `1s 500ms`.
pub fn format_duration(duration: Duration) -> String {
  let rounded = Duration::from_millis(duration.as_millis() as u64);
  humantime::format_duration(rounded).to_string()
}

pub fn print_success(message: &str) {
  eprintln!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stderr, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  eprintln!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stderr, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  eprintln!(
    "  {}: {}",
    label.if_supports_color(Stream::Stderr, |s| s.dimmed()),
    value
  );
}

/// One JSON object per line, for machine consumers of a live stream.
pub fn print_json_line<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Print a build event as text. Build log output passes through verbatim.
pub fn print_event(event: &BuildEvent) {
  match event {
    BuildEvent::Stream { text } => print!("{}", text),
    BuildEvent::Status { id, status, progress } => {
      let id = id.as_deref().map(|id| format!("{}: ", id)).unwrap_or_default();
      let progress = progress.as_deref().unwrap_or_default();
      println!(
        "{} {}{} {}",
        symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.cyan()),
        id,
        status,
        progress.if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    }
    BuildEvent::Aux { value } => {
      if let Some(image) = value.get("ID").and_then(|v| v.as_str()) {
        println!(
          "{} image {}",
          symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
          image
        );
      }
    }
    BuildEvent::Other { .. } => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_bytes() {
    assert_eq!(format_bytes(500), "500 B");
    assert_eq!(format_bytes(1024), "1.0 KB");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(1048576), "1.0 MB");
    assert_eq!(format_bytes(1073741824), "1.0 GB");
  }

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1s 500ms");
    assert_eq!(format_duration(Duration::from_micros(65_000_400)), "1m 5s");
  }

  #[test]
  fn test_output_format() {
    assert!(OutputFormat::Json.is_json());
    assert!(!OutputFormat::Text.is_json());
  }
}
