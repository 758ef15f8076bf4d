use anyhow::{Context, Result};
use chrono::Local;
use std::path::Path;

use crate::crontab::TaskStore;
use crate::identity::Identity;
use crate::models::Action;
use crate::prompt::Prompter;
use crate::rcs::Revisions;
use crate::reconcile;
use crate::storage::SnapshotStore;

// one invocation: a crontab, a revision backend and a way to ask the user,
// bound to the snapshot of the invoking user on this host
pub struct Session<T, R, P> {
    tasks: T,
    revisions: R,
    prompter: P,
    store: SnapshotStore,
    identity: Identity,
}

impl<T: TaskStore, R: Revisions, P: Prompter> Session<T, R, P> {
    pub fn new(
        tasks: T,
        revisions: R,
        prompter: P,
        store: SnapshotStore,
        identity: Identity,
    ) -> Self {
        Self { tasks, revisions, prompter, store, identity }
    }

    // returns the exit code the process should end with
    pub fn run(&mut self, action: &Action) -> Result<i32> {
        tracing::debug!(%action, "dispatching");
        match action {
            Action::Install(source) => self.install(source),
            Action::Edit => self.edit(),
            Action::List => self.tasks.show(),
            Action::Remove => self.remove(),
        }
    }

    pub fn install(&mut self, source: &Path) -> Result<i32> {
        let status = self.tasks.install(source)?;
        if status != 0 {
            tracing::warn!(status, "install failed, snapshot left alone");
            return Ok(status);
        }
        self.sync(&Action::Install(source.to_path_buf()))?;
        Ok(0)
    }

    pub fn remove(&mut self) -> Result<i32> {
        let status = self.tasks.remove()?;
        if status != 0 {
            tracing::warn!(status, "remove failed, snapshot left alone");
            return Ok(status);
        }
        self.sync(&Action::Remove)?;
        Ok(0)
    }

    pub fn edit(&mut self) -> Result<i32> {
        let message = self.commit_message("reconcile before edit");
        reconcile::reconcile(
            &mut self.tasks,
            &mut self.revisions,
            &mut self.prompter,
            &self.store,
            &message,
        )?;

        let outcome = self.tasks.edit()?;
        if outcome.needs_sync() {
            self.sync(&Action::Edit)?;
        } else {
            tracing::debug!(
                status = outcome.status,
                changed = outcome.changed,
                stderr = %outcome.stderr.trim_end(),
                "nothing to sync"
            );
        }
        Ok(outcome.status)
    }

    // the live crontab has already changed by now, so a failure here is fatal
    fn sync(&mut self, action: &Action) -> Result<()> {
        let live = self.tasks.list()?.unwrap_or_default();
        let message = self.commit_message(&action.to_string());
        self.store
            .commit(&live, &mut self.revisions, &message)
            .context("crontab changed but the versioned copy could not be updated")
    }

    fn commit_message(&self, what: &str) -> String {
        format!(
            "{} by {}@{} at {}",
            what,
            self.identity.user,
            self.identity.host,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )
    }
}
