use anyhow::{Context, Result};
use regex::Regex;
use std::ffi::OsStr;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::error::CronVcError;
use crate::models::{EditOutcome, TaskList};

/// The per-user scheduler store. Everything goes through its command-line tool.
pub trait TaskStore {
    fn install(&mut self, source: &Path) -> Result<i32>;
    fn remove(&mut self) -> Result<i32>;
    /// `None` when the user has no crontab at all.
    fn list(&mut self) -> Result<Option<TaskList>>;
    fn edit(&mut self) -> Result<EditOutcome>;
    // plain -l passthrough straight to the terminal
    fn show(&mut self) -> Result<i32>;
}

pub struct SystemCrontab {
    program: PathBuf,
    no_crontab: Regex,
    no_changes: Regex,
}

impl SystemCrontab {
    pub fn new(program: impl Into<PathBuf>, no_crontab: Regex, no_changes: Regex) -> Self {
        Self { program: program.into(), no_crontab, no_changes }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    fn run_inherited(&self, args: &[&OsStr]) -> Result<i32> {
        tracing::debug!(program = %self.program.display(), ?args, "running");
        let status = self
            .command()
            .args(args)
            .status()
            .with_context(|| format!("couldn't run {}", self.program.display()))?;
        Ok(status_code(status))
    }

    fn failure(&self, status: ExitStatus, stderr: String) -> CronVcError {
        CronVcError::ToolFailure {
            tool: self.program.display().to_string(),
            status: status_code(status),
            stderr,
        }
    }
}

impl TaskStore for SystemCrontab {
    fn install(&mut self, source: &Path) -> Result<i32> {
        self.run_inherited(&[source.as_os_str()])
    }

    fn remove(&mut self) -> Result<i32> {
        self.run_inherited(&[OsStr::new("-r")])
    }

    fn list(&mut self) -> Result<Option<TaskList>> {
        let output = self
            .command()
            .arg("-l")
            .output()
            .with_context(|| format!("couldn't run {}", self.program.display()))?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            return Ok(Some(TaskList::from_bytes(strip_vixie_header(&output.stdout))));
        }
        if self.no_crontab.is_match(&stderr) {
            tracing::debug!("no crontab installed");
            return Ok(None);
        }
        Err(self.failure(output.status, stderr).into())
    }

    fn edit(&mut self) -> Result<EditOutcome> {
        // the editor needs the real terminal, only stderr is ours to inspect
        let output = self
            .command()
            .arg("-e")
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("couldn't run {}", self.program.display()))?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        eprint!("{stderr}");
        let changed = !self.no_changes.is_match(&stderr);
        Ok(EditOutcome { status: status_code(output.status), stderr, changed })
    }

    fn show(&mut self) -> Result<i32> {
        self.run_inherited(&[OsStr::new("-l")])
    }
}

pub fn status_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

// Vixie cron prepends three comment lines to `crontab -l` output
pub fn strip_vixie_header(listing: &[u8]) -> &[u8] {
    let mut rest = listing;
    for prefix in ["# DO NOT EDIT THIS FILE", "# (", "# (Cron version"] {
        match rest.iter().position(|b| *b == b'\n') {
            Some(end) if rest.starts_with(prefix.as_bytes()) => rest = &rest[end + 1..],
            _ => return listing,
        }
    }
    rest
}
