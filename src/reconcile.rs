use anyhow::Result;
use std::collections::HashSet;
use std::fmt;

use crate::crontab::TaskStore;
use crate::error::CronVcError;
use crate::models::{Snapshot, TaskList};
use crate::prompt::Prompter;
use crate::rcs::Revisions;
use crate::storage::SnapshotStore;

const ASK_START: &str = "Your crontab is not under version control yet. Start versioning it?";
const ASK_RESTORE: &str = "You have no crontab, but a versioned copy exists. Install it?";
const ASK_COMMIT: &str =
    "Your crontab differs from the versioned copy. Commit the current crontab?";

// how the live crontab relates to the versioned copy before an edit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Drift {
    FirstUse,
    // no live crontab, but a non-empty versioned copy
    LiveMissing,
    Diverged,
    InSync,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::FirstUse => write!(f, "first use"),
            Drift::LiveMissing => write!(f, "live crontab missing"),
            Drift::Diverged => write!(f, "diverged"),
            Drift::InSync => write!(f, "in sync"),
        }
    }
}

// first matching row wins
pub fn assess(live: Option<&TaskList>, snapshot: Option<&Snapshot>) -> Drift {
    match (live, snapshot) {
        (_, None) => Drift::FirstUse,
        (None, Some(snapshot)) if !snapshot.is_empty() => Drift::LiveMissing,
        (Some(live), Some(snapshot)) if live != snapshot => Drift::Diverged,
        _ => Drift::InSync,
    }
}

// lines only in the snapshot prefixed with "-", lines only in the live crontab with "+"
pub fn describe_drift(live: &TaskList, snapshot: &Snapshot) -> String {
    let live_set: HashSet<&[u8]> = live.lines().iter().map(Vec::as_slice).collect();
    let snap_set: HashSet<&[u8]> = snapshot.lines().iter().map(Vec::as_slice).collect();

    let mut out = String::new();
    for line in snapshot.lines().iter().filter(|l| !live_set.contains(l.as_slice())) {
        out.push_str(&format!("- {}\n", display_line(line)));
    }
    for line in live.lines().iter().filter(|l| !snap_set.contains(l.as_slice())) {
        out.push_str(&format!("+ {}\n", display_line(line)));
    }
    if out.is_empty() {
        // same lines, different order or duplicates
        out.push_str("(lines reordered)\n");
    }
    out
}

// display only; the stored bytes are never rewritten
fn display_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

// bring the live crontab and the versioned copy to a common baseline
// before an interactive edit, asking the user at every fork
pub fn reconcile<T, R, P>(
    tasks: &mut T,
    revisions: &mut R,
    prompter: &mut P,
    store: &SnapshotStore,
    message: &str,
) -> Result<Drift>
where
    T: TaskStore + ?Sized,
    R: Revisions + ?Sized,
    P: Prompter + ?Sized,
{
    let live = tasks.list()?;
    let snapshot = store.read()?;
    let drift = assess(live.as_ref(), snapshot.as_ref());
    tracing::info!(%drift, "checked crontab against versioned copy");

    match drift {
        Drift::FirstUse => {
            if !prompter.ask(ASK_START)? {
                return Err(CronVcError::Declined("versioning was not started".into()).into());
            }
            store.commit(&live.unwrap_or_default(), revisions, message)?;
        }
        Drift::LiveMissing => {
            if prompter.ask(ASK_RESTORE)? {
                let path = store.path(false)?;
                let status = tasks.install(&path)?;
                if status != 0 {
                    return Err(CronVcError::ToolFailure {
                        tool: "crontab".into(),
                        status,
                        stderr: format!("couldn't install {}", path.display()),
                    }
                    .into());
                }
            } else {
                tracing::info!("left live crontab empty, versioned copy untouched");
            }
        }
        Drift::Diverged => {
            if let (Some(live), Some(snapshot)) = (&live, &snapshot) {
                eprint!("{}", describe_drift(live, snapshot));
            }
            if !prompter.ask(ASK_COMMIT)? {
                let reason = "crontab and versioned copy differ".to_string();
                return Err(CronVcError::Declined(reason).into());
            }
            store.commit(&live.unwrap_or_default(), revisions, message)?;
        }
        Drift::InSync => {}
    }
    Ok(drift)
}
