//! Console progress output
//!
//! Human-readable, color-coded lines for each build stage. Lines are printed
//! through the shared `MultiProgress` so they never tear running spinners.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

use console::{style, StyledObject};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::orchestrator::BuildReport;

#[derive(Debug, Clone)]
pub struct Reporter {
    multi: MultiProgress,
    root: PathBuf,
    quiet: bool,
    timestamps: bool,
}

impl Reporter {
    pub fn new(root: &Path, quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            root: root.to_path_buf(),
            quiet,
            timestamps: false,
        }
    }

    /// A reporter that prints nothing; used by tests and `--quiet`
    pub fn hidden(root: &Path) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            root: root.to_path_buf(),
            quiet: true,
            timestamps: false,
        }
    }

    /// Prefix every following line with the wall-clock time (watch mode)
    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    fn line(&self, tag: StyledObject<&str>, message: impl Display) {
        if self.quiet {
            return;
        }
        let stamp = if self.timestamps {
            format!("{} ", style(chrono::Local::now().format("%H:%M:%S")).dim())
        } else {
            String::new()
        };
        self.multi.suspend(|| println!("{}{} {}", stamp, tag, message));
    }

    fn display<'a>(&self, path: &'a Path) -> std::path::Display<'a> {
        path.strip_prefix(&self.root).unwrap_or(path).display()
    }

    pub fn compiling(&self, source: &Path) {
        self.line(style("[compiling]").green().bold(), self.display(source));
    }

    pub fn compiled(&self, source: &Path) {
        self.line(style("[compiled]").green().bold(), self.display(source));
    }

    pub fn failed(&self, source: &Path, error: &(dyn std::error::Error + 'static)) {
        let mut message = error.to_string();
        let mut cause = error.source();
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }
        self.line(
            style("[failed]").red().bold(),
            format!("{} {}", self.display(source), style(message).red()),
        );
    }

    /// Raw compiler diagnostics, printed as the compiler wrote them
    pub fn passthrough(&self, text: &str) {
        if self.quiet {
            return;
        }
        self.multi.suspend(|| eprint!("{}", text));
    }

    pub fn written(&self, destination: &Path) {
        self.line(style("[written]").cyan().bold(), destination.display());
    }

    pub fn copied(&self, destination: &Path) {
        self.line(style("[copied]").cyan().bold(), destination.display());
    }

    pub fn watching(&self, patterns: &[String]) {
        self.line(
            style("[watching]").green().bold(),
            style(patterns.join(", ")).dim(),
        );
    }

    pub fn changed(&self, path: &Path) {
        self.line(style("[changed]").yellow().bold(), self.display(path));
    }

    pub fn build_complete(&self, report: &BuildReport) {
        let failed = report.failed();
        let summary = format!(
            "{} files built in {:.2}s",
            report.succeeded(),
            report.duration.as_secs_f64()
        );
        if failed == 0 {
            self.line(style("[build complete]").green().bold(), summary);
        } else {
            self.line(
                style("[build complete]").yellow().bold(),
                format!("{}, {}", summary, style(format!("{} failed", failed)).red()),
            );
        }
    }

    /// Spinner shown while a build step runs
    pub fn spinner(&self, message: impl Into<String>) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(message.into());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}
