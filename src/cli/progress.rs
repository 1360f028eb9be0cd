//! Progress bar utilities for CLI output
//!
//! This module renders the phases of a download session:
//!
//! - a spinner while the source is scanned
//! - a bar while capture dates are read
//! - a bar while images are renamed and transferred
//!
//! Bars suspend cleanly when a message is printed.

use crate::session::SessionProgress;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::{Duration, Instant};

// ============================================================================
// Styles - Consistent visual appearance
// ============================================================================

/// Get the spinner style for scanning
fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷")
}

/// Get the progress bar style for metadata and download phases
fn progress_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} [{bar:40.cyan/dim}] {pos}/{len} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━╾─")
}

/// Get the style for completed progress bars
fn completed_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  ✓ [{bar:40.green/dim}] {pos}/{len} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━━")
}

// ============================================================================
// Console output helpers
// ============================================================================

/// Print a header section with a box
pub fn print_header(title: &str) {
    let width = 68;
    let title_padded = format!("{:^width$}", title, width = width - 4);
    println!();
    println!("╔{}╗", "═".repeat(width - 2));
    println!("║{}║", title_padded);
    println!("╚{}╝", "═".repeat(width - 2));
    println!();
}

/// Print a success message with checkmark
pub fn print_success(msg: &str) {
    println!("  ✓ {}", msg);
}

/// Print an info message with bullet
pub fn print_info(msg: &str) {
    println!("  • {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("  ⚠ {}", msg);
}

// ============================================================================
// Session progress display
// ============================================================================

enum Phase {
    Idle,
    Scanning(ProgressBar),
    Metadata(ProgressBar),
    Downloading(ProgressBar),
}

/// Terminal rendering of a download session
pub struct SessionDisplay {
    phase: Phase,
    start_time: Instant,
}

impl SessionDisplay {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            start_time: Instant::now(),
        }
    }

    fn bar(total: usize, msg: &'static str) -> ProgressBar {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(progress_bar_style());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(msg);
        bar
    }

    /// Close the current phase, keeping its last line on screen
    fn finish_phase(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => {}
            Phase::Scanning(spinner) => spinner.finish(),
            Phase::Metadata(bar) | Phase::Downloading(bar) => {
                bar.set_style(completed_style());
                bar.finish();
            }
        }
    }

    /// Finish every bar and print the final message
    pub fn finish(&mut self, message: &str) {
        self.finish_phase();
        print_success(&format!(
            "{} ({})",
            message,
            format_duration(self.start_time.elapsed())
        ));
    }
}

impl Default for SessionDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProgress for SessionDisplay {
    fn scanned(&mut self, found: usize) {
        if !matches!(self.phase, Phase::Scanning(_)) {
            self.finish_phase();
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(spinner_style());
            spinner.enable_steady_tick(Duration::from_millis(80));
            self.phase = Phase::Scanning(spinner);
        }
        if let Phase::Scanning(spinner) = &self.phase {
            spinner.set_message(format!("Scanning: {} images found", found));
        }
    }

    fn metadata_loaded(&mut self, done: usize, total: usize) {
        if !matches!(self.phase, Phase::Metadata(_)) {
            self.finish_phase();
            self.phase = Phase::Metadata(Self::bar(total, "Reading capture dates"));
        }
        if let Phase::Metadata(bar) = &self.phase {
            bar.set_position(done as u64);
        }
    }

    fn download_started(&mut self, total: usize) {
        self.finish_phase();
        self.phase = Phase::Downloading(Self::bar(total, "Downloading"));
    }

    fn downloaded(&mut self, done: usize) {
        if let Phase::Downloading(bar) = &self.phase {
            bar.set_position(done as u64);
        }
    }
}

// ============================================================================
// Utility functions
// ============================================================================

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    } else if secs >= 60 {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

// ============================================================================
// Dual writer for file + console logging
// ============================================================================

/// A writer that writes to both console and file
///
/// Used for logging to both stderr and a log file simultaneously.
pub struct DualWriter {
    pub console: std::io::Stderr,
    pub file: std::fs::File,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.console.write(buf);
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}

// ============================================================================
// Tests
// ============================================================================
