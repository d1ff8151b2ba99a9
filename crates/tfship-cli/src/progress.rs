//! Per-platform progress with TTY detection.
//!
//! On a terminal a progress bar is drawn on stderr; otherwise each platform
//! gets a plain `[n/total]` line.

use std::io::IsTerminal;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

/// Detects whether stderr is connected to a TTY.
pub fn is_tty() -> bool {
    std::io::stderr().is_terminal()
}

pub struct ProgressReporter {
    is_tty: bool,
    total: usize,
    /// 1-based position of the current manifest line
    current: usize,
    current_label: String,
    /// Only used in TTY mode
    progress_bar: Option<ProgressBar>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        let is_tty = is_tty();
        let progress_bar = if is_tty {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:30} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        Self {
            is_tty,
            total,
            current: 0,
            current_label: String::new(),
            progress_bar,
            start_time: Instant::now(),
        }
    }

    /// A reporter that never draws a bar, whatever stderr is.
    pub fn silent(total: usize) -> Self {
        Self {
            is_tty: false,
            total,
            current: 0,
            current_label: String::new(),
            progress_bar: None,
            start_time: Instant::now(),
        }
    }

    /// Start manifest line `index` (1-based).
    pub fn set_item(&mut self, index: usize, label: &str) {
        self.current = index;
        self.current_label = label.to_string();
        let msg = format!("[{}/{}] {}", self.current, self.total, self.current_label);

        match &self.progress_bar {
            Some(pb) if self.is_tty => {
                pb.set_position(self.current.saturating_sub(1) as u64);
                pb.set_message(msg);
            }
            _ => eprintln!("{msg}"),
        }
    }

    pub fn finish_item(&mut self) {
        if let Some(pb) = &self.progress_bar {
            pb.inc(1);
        }
    }

    /// Print a log line without tearing the bar.
    pub fn println(&self, line: &str) {
        match &self.progress_bar {
            Some(pb) => pb.println(line),
            None => eprintln!("{line}"),
        }
    }

    pub fn finish(self) {
        let elapsed = self.start_time.elapsed();
        let msg = format!("processed {} platform(s) in {elapsed:.1?}", self.total);
        match self.progress_bar {
            Some(pb) => pb.finish_with_message(msg),
            None => eprintln!("{msg}"),
        }
    }
}
