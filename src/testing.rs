// In-memory stand-ins for crontab, RCS and the terminal, plus shell-script
// stand-ins for exercising the real subprocess adapters.

use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::crontab::TaskStore;
use crate::error::CronVcError;
use crate::models::{EditOutcome, TaskList};
use crate::prompt::Prompter;
use crate::rcs::Revisions;

#[derive(Debug, Default)]
pub struct MemoryCrontab {
    pub live: Option<TaskList>,
    // what the user "types" into the next edit(), None quits without saving
    pub edit_to: Option<TaskList>,
    // status returned by the next mutating call instead of succeeding
    pub fail_with: Option<i32>,
    pub calls: Vec<&'static str>,
}

impl MemoryCrontab {
    pub fn with_live(text: &str) -> Self {
        Self { live: Some(TaskList::from_text(text)), ..Self::default() }
    }

    fn failure(&mut self) -> Option<i32> {
        self.fail_with.take()
    }
}

impl TaskStore for MemoryCrontab {
    fn install(&mut self, source: &Path) -> Result<i32> {
        self.calls.push("install");
        if let Some(status) = self.failure() {
            return Ok(status);
        }
        self.live = Some(TaskList::from_bytes(&fs::read(source)?));
        Ok(0)
    }

    fn remove(&mut self) -> Result<i32> {
        self.calls.push("remove");
        if let Some(status) = self.failure() {
            return Ok(status);
        }
        if self.live.take().is_none() {
            return Ok(1);
        }
        Ok(0)
    }

    fn list(&mut self) -> Result<Option<TaskList>> {
        self.calls.push("list");
        Ok(self.live.clone())
    }

    fn edit(&mut self) -> Result<EditOutcome> {
        self.calls.push("edit");
        if let Some(status) = self.failure() {
            return Ok(EditOutcome {
                status,
                stderr: "crontab: errors in crontab file, can't install.\n".into(),
                changed: true,
            });
        }
        match self.edit_to.take() {
            Some(tasks) if self.live.as_ref() != Some(&tasks) => {
                self.live = Some(tasks);
                Ok(EditOutcome {
                    status: 0,
                    stderr: "crontab: installing new crontab\n".into(),
                    changed: true,
                })
            }
            _ => Ok(EditOutcome {
                status: 0,
                stderr: "crontab: no changes made to crontab\n".into(),
                changed: false,
            }),
        }
    }

    fn show(&mut self) -> Result<i32> {
        self.calls.push("show");
        Ok(if self.live.is_some() { 0 } else { 1 })
    }
}

#[derive(Debug, Default)]
pub struct MemoryRevisions {
    pub checkouts: Vec<PathBuf>,
    pub checkins: Vec<(PathBuf, String)>,
    pub locked_by_other: bool,
    revisions: HashMap<PathBuf, Vec<TaskList>>,
}

impl MemoryRevisions {
    pub fn history(&self, path: &Path) -> &[TaskList] {
        self.revisions.get(path).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Revisions for MemoryRevisions {
    fn checkout_lock(&mut self, path: &Path) -> Result<()> {
        if self.locked_by_other {
            return Err(CronVcError::Locked { path: path.to_path_buf() }.into());
        }
        self.checkouts.push(path.to_path_buf());
        Ok(())
    }

    fn checkin_unlock(&mut self, path: &Path, message: &str) -> Result<()> {
        let content = TaskList::from_bytes(&fs::read(path)?);
        self.revisions.entry(path.to_path_buf()).or_default().push(content);
        self.checkins.push((path.to_path_buf(), message.to_string()));
        Ok(())
    }
}

// replays canned answers, an unexpected question is an error
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<bool>,
    pub asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn answering(answers: &[bool]) -> Self {
        Self { answers: answers.iter().copied().collect(), asked: Vec::new() }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, question: &str) -> Result<bool> {
        self.asked.push(question.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("unexpected prompt: {}", question))
    }
}

// executable /bin/sh script named `name` inside `dir`
pub fn fake_tool(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
