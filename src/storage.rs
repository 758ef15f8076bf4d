use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::CronVcError;
use crate::models::{Snapshot, TaskList};
use crate::rcs::Revisions;

const RCS_DIR: &str = "RCS";
const LOCK_SUFFIX: &str = ".lock";
const LOCK_ATTEMPTS: u32 = 3;

// the tree is shared by every user on the host
const SHARED_DIR_MODE: u32 = 0o777;
const SHARED_FILE_MODE: u32 = 0o666;

// versioned copy of one user's crontab on one host:
// root/<host>/<user><extension>, history under root/<host>/RCS
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    root: PathBuf,
    host: String,
    user: String,
    extension: String,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, host: &str, user: &str, extension: &str) -> Self {
        Self {
            root: root.into(),
            host: host.to_string(),
            user: user.to_string(),
            extension: extension.to_string(),
        }
    }

    pub fn host_dir(&self) -> PathBuf {
        self.root.join(&self.host)
    }

    fn file_name(&self) -> String {
        format!("{}{}", self.user, self.extension)
    }

    fn lock_path(&self) -> PathBuf {
        self.host_dir().join(format!("{}{}", self.file_name(), LOCK_SUFFIX))
    }

    pub fn path(&self, create_dirs: bool) -> Result<PathBuf> {
        let host_dir = self.host_dir();
        if create_dirs {
            for dir in [self.root.clone(), host_dir.clone(), host_dir.join(RCS_DIR)] {
                ensure_shared_dir(&dir)?;
            }
        }
        Ok(host_dir.join(self.file_name()))
    }

    // None only when there is no snapshot file yet, other I/O errors surface
    pub fn read(&self) -> Result<Option<Snapshot>> {
        let path = self.path(false)?;
        match fs::read(&path) {
            Ok(content) => Ok(Some(TaskList::from_bytes(&content))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CronVcError::SnapshotRead { path, source }.into()),
        }
    }

    pub fn write(&self, tasks: &TaskList) -> Result<()> {
        let path = self.path(true)?;
        fs::write(&path, tasks.to_bytes())
            .with_context(|| format!("couldn't write snapshot {}", path.display()))
    }

    // check out (when a previous revision exists), overwrite, check in,
    // all under the sidecar lock
    pub fn commit<R: Revisions + ?Sized>(
        &self,
        tasks: &TaskList,
        revisions: &mut R,
        message: &str,
    ) -> Result<()> {
        let path = self.path(true)?;
        let lock_path = self.lock_path();
        let lock_file = open_lock_file(&lock_path)?;

        with_file_lock(&lock_file, &lock_path, || {
            if path.exists() {
                revisions.checkout_lock(&path)?;
            } else {
                tracing::debug!(path = %path.display(), "no snapshot yet, skipping checkout");
            }
            self.write(tasks)?;
            revisions.checkin_unlock(&path, message)?;
            tracing::info!(path = %path.display(), lines = tasks.len(), "committed snapshot");
            Ok(())
        })
    }
}

// create if missing; existing dirs may belong to someone else so leave their mode alone
fn ensure_shared_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    match DirBuilder::new().mode(SHARED_DIR_MODE).create(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("couldn't create {}", dir.display()));
        }
    }
    // umask strips bits from the mode given to mkdir
    fs::set_permissions(dir, fs::Permissions::from_mode(SHARED_DIR_MODE))
        .with_context(|| format!("couldn't make {} world-writable", dir.display()))
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .mode(SHARED_FILE_MODE)
        .open(path)
        .with_context(|| format!("couldn't open lock file {}", path.display()))
}

// try to get an exclusive lock on a file, with exponential backoff
// gives up after 3 attempts
pub fn with_file_lock<F, T>(file: &File, path: &Path, operation: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    for attempt in 0..LOCK_ATTEMPTS {
        if file.try_lock_exclusive().is_ok() {
            let result = operation();
            let _ = FileExt::unlock(file);
            return result;
        }
        tracing::debug!(attempt, path = %path.display(), "snapshot lock busy");
        // no point waiting after the last try
        if attempt + 1 < LOCK_ATTEMPTS {
            thread::sleep(Duration::from_millis(100 * (1 << (attempt + 1))));
        }
    }
    Err(CronVcError::Locked { path: path.to_path_buf() }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRevisions;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SnapshotStore {
        SnapshotStore::new(dir.path().join("vc"), "box.example.org", "alice", ".cron")
    }

    #[test]
    fn test_path_layout() {
        let dir = TempDir::new().unwrap();
        let path = store(&dir).path(false).unwrap();
        assert_eq!(path, dir.path().join("vc/box.example.org/alice.cron"));
        assert!(!dir.path().join("vc").exists());
    }

    #[test]
    fn test_path_creates_shared_dirs() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.path(true).unwrap();
        for sub in ["vc", "vc/box.example.org", "vc/box.example.org/RCS"] {
            let meta = fs::metadata(dir.path().join(sub)).unwrap();
            assert!(meta.is_dir());
            assert_eq!(meta.permissions().mode() & 0o777, 0o777, "{sub}");
        }
        // idempotent
        store.path(true).unwrap();
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).read().unwrap(), None);
    }

    #[test]
    fn test_read_error_surfaces() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        // a directory where the file should be
        fs::create_dir_all(store.path(true).unwrap()).unwrap();
        let err = store.read().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CronVcError>(),
            Some(CronVcError::SnapshotRead { .. })
        ));
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let tasks = TaskList::from_text("0 0 * * * /bin/true\n");
        store.write(&tasks).unwrap();
        assert_eq!(store.read().unwrap(), Some(tasks));
    }

    #[test]
    fn test_snapshot_keeps_raw_bytes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let raw = b"# caf\xe9\n0 0 * * * /bin/true\n";
        store.write(&TaskList::from_bytes(raw)).unwrap();
        assert_eq!(fs::read(store.path(false).unwrap()).unwrap(), raw.to_vec());
        assert_eq!(store.read().unwrap(), Some(TaskList::from_bytes(raw)));
    }

    #[test]
    fn test_empty_snapshot_is_present() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.write(&TaskList::default()).unwrap();
        assert_eq!(store.read().unwrap(), Some(TaskList::default()));
    }

    #[test]
    fn test_first_commit_skips_checkout() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut revisions = MemoryRevisions::default();
        store.commit(&TaskList::from_text("@hourly a\n"), &mut revisions, "first").unwrap();

        let path = store.path(false).unwrap();
        assert!(revisions.checkouts.is_empty());
        assert_eq!(revisions.checkins, vec![(path, "first".to_string())]);
    }

    #[test]
    fn test_later_commit_checks_out_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut revisions = MemoryRevisions::default();
        store.commit(&TaskList::from_text("@hourly a\n"), &mut revisions, "one").unwrap();
        store.commit(&TaskList::from_text("@hourly b\n"), &mut revisions, "two").unwrap();

        let path = store.path(false).unwrap();
        assert_eq!(revisions.checkouts, vec![path.clone()]);
        assert_eq!(revisions.checkins.len(), 2);
        assert_eq!(revisions.history(&path).last(), Some(&TaskList::from_text("@hourly b\n")));
    }

    #[test]
    fn test_checkout_conflict_leaves_snapshot_alone() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut revisions = MemoryRevisions::default();
        store.commit(&TaskList::from_text("@hourly a\n"), &mut revisions, "one").unwrap();

        revisions.locked_by_other = true;
        let err = store
            .commit(&TaskList::from_text("@hourly b\n"), &mut revisions, "two")
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CronVcError>(), Some(CronVcError::Locked { .. })));
        assert_eq!(store.read().unwrap(), Some(TaskList::from_text("@hourly a\n")));
    }

    #[test]
    fn test_busy_sidecar_lock_fails_fast() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.path(true).unwrap();
        let held = open_lock_file(&store.lock_path()).unwrap();
        held.lock_exclusive().unwrap();

        let mut revisions = MemoryRevisions::default();
        let err = store
            .commit(&TaskList::from_text("@hourly a\n"), &mut revisions, "blocked")
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CronVcError>(), Some(CronVcError::Locked { .. })));
        assert!(revisions.checkins.is_empty());
    }

    #[test]
    fn test_busy_lock_gives_up_without_final_wait() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("busy.lock");
        let held = open_lock_file(&path).unwrap();
        held.lock_exclusive().unwrap();

        let contender = open_lock_file(&path).unwrap();
        let started = std::time::Instant::now();
        let result = with_file_lock(&contender, &path, || Ok(()));
        assert!(result.is_err());
        // 200ms + 400ms of backoff, the 800ms after the last try is skipped
        assert!(started.elapsed() < Duration::from_millis(1200));
    }
}
