use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::crontab::status_code;
use crate::error::CronVcError;

const RCS_DIR: &str = "RCS";
const DESCRIPTION: &str = "crontab snapshot maintained by crontab-vc";

// lock-and-version backend wrapped around every snapshot write
pub trait Revisions {
    // take the revision lock and make the working file writable
    fn checkout_lock(&mut self, path: &Path) -> Result<()>;

    // record a new revision and drop the lock
    fn checkin_unlock(&mut self, path: &Path, message: &str) -> Result<()>;
}

// co/ci from GNU RCS; archives live in the RCS/ directory next to the
// working file, which both tools pick up on their own
#[derive(Clone, Debug)]
pub struct RcsTool {
    co: PathBuf,
    ci: PathBuf,
}

impl RcsTool {
    pub fn new(co: impl Into<PathBuf>, ci: impl Into<PathBuf>) -> Self {
        Self { co: co.into(), ci: ci.into() }
    }
}

pub fn archive_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    Some(parent.join(RCS_DIR).join(format!("{name},v")))
}

fn has_archive(path: &Path) -> bool {
    archive_path(path).is_some_and(|archive| archive.exists())
}

impl Revisions for RcsTool {
    fn checkout_lock(&mut self, path: &Path) -> Result<()> {
        if !has_archive(path) {
            tracing::debug!(path = %path.display(), "no RCS archive yet, nothing to lock");
            return Ok(());
        }

        tracing::debug!(path = %path.display(), "co -l");
        let output = Command::new(&self.co)
            .args(["-l", "-q"])
            .arg(path)
            .output()
            .with_context(|| format!("couldn't run {}", self.co.display()))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.contains("locked by") {
            return Err(CronVcError::Locked { path: path.to_path_buf() }.into());
        }
        Err(CronVcError::ToolFailure {
            tool: self.co.display().to_string(),
            status: status_code(output.status),
            stderr,
        }
        .into())
    }

    fn checkin_unlock(&mut self, path: &Path, message: &str) -> Result<()> {
        let mut command = Command::new(&self.ci);
        command.args(["-u", "-q"]);
        // ci prompts for a description on the very first checkin otherwise
        if !has_archive(path) {
            command.arg(format!("-t-{DESCRIPTION}"));
        }
        command.arg(format!("-m{message}")).arg(path);

        tracing::debug!(path = %path.display(), "ci -u");
        let output = command
            .output()
            .with_context(|| format!("couldn't run {}", self.ci.display()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CronVcError::ToolFailure {
                tool: self.ci.display().to_string(),
                status: status_code(output.status),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }
            .into())
        }
    }
}
