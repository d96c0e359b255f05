//! On-disk artifact lifecycle.
//!
//! Every run writes into a freshly allocated temp file, and the output it
//! replaces survives as a one-generation undo snapshot. This store is the
//! single owner of those files: nothing else creates or deletes them, and all
//! transitions go through the named operations below. Deletions are
//! best-effort: a file that refuses to die is reported on the event channel
//! and forgotten, never allowed to wedge the run state.

use crate::model::{InfoEvent, JobEvent};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

const OUTPUT_PREFIX: &str = "filterpipe_";
const UNDO_PREFIX: &str = "filterpipe_prev_";
const RESTORE_PREFIX: &str = "filterpipe_restored_";
const ARTIFACT_SUFFIX: &str = ".png";

/// Tracks the two artifact slots: the image shown to the user (`current`) and
/// the pre-run snapshot undo restores (`previous`). At most one of each.
pub struct ArtifactStore {
    current: Option<PathBuf>,
    previous: Option<PathBuf>,
    dir: Option<PathBuf>,
    events: UnboundedSender<JobEvent>,
}

impl ArtifactStore {
    pub fn new(events: UnboundedSender<JobEvent>) -> Self {
        Self {
            current: None,
            previous: None,
            dir: None,
            events,
        }
    }

    #[cfg(test)]
    fn in_dir(dir: &Path, events: UnboundedSender<JobEvent>) -> Self {
        Self {
            current: None,
            previous: None,
            dir: Some(dir.to_path_buf()),
            events,
        }
    }

    /// Path of the latest committed output, if any run has succeeded since
    /// the source was loaded.
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn undo_available(&self) -> bool {
        self.previous.is_some()
    }

    /// Allocate the file the next run will write. Nothing else changes: the
    /// target only enters the store when the run commits.
    pub fn create_output_target(&self) -> io::Result<PathBuf> {
        self.alloc(OUTPUT_PREFIX)
    }

    /// Replace the undo snapshot with a byte copy of `source`, taken before a
    /// run starts so the pre-run image stays recoverable whatever the engine
    /// does to its output.
    pub fn snapshot_previous(&mut self, source: &Path) -> io::Result<PathBuf> {
        if let Some(old) = self.previous.take() {
            self.remove_best_effort(&old);
        }
        let snapshot = self.alloc(UNDO_PREFIX)?;
        if let Err(err) = fs::copy(source, &snapshot) {
            self.remove_best_effort(&snapshot);
            return Err(err);
        }
        self.previous = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Install a successful run's output as the new current artifact. The
    /// file that was current before the run is deleted.
    pub fn commit(&mut self, new_current: PathBuf) {
        if let Some(old) = self.current.take() {
            if old != new_current {
                self.remove_best_effort(&old);
            }
        }
        self.current = Some(new_current);
    }

    /// Drop a failed run's target, which may be partial or corrupt. `current`
    /// keeps its pre-run value untouched.
    pub fn rollback_after_failure(&self, target: &Path) {
        self.remove_best_effort(target);
    }

    /// Swap the undo snapshot back in: the snapshot's bytes land in a fresh
    /// file that becomes `current`, the displaced current is deleted, and the
    /// snapshot is consumed. One generation deep; a second call without an
    /// intervening run returns `None`.
    pub fn undo(&mut self) -> io::Result<Option<PathBuf>> {
        let Some(snapshot) = self.previous.clone() else {
            return Ok(None);
        };
        let restored = self.alloc(RESTORE_PREFIX)?;
        if let Err(err) = fs::copy(&snapshot, &restored) {
            self.remove_best_effort(&restored);
            return Err(err);
        }
        if let Some(displaced) = self.current.take() {
            self.remove_best_effort(&displaced);
        }
        self.previous = None;
        self.remove_best_effort(&snapshot);
        self.current = Some(restored.clone());
        Ok(Some(restored))
    }

    /// A brand-new source was loaded: its predecessor's output is stale, so
    /// the current artifact goes away. The undo snapshot survives until the
    /// next run replaces it.
    pub fn clear_current(&mut self) {
        if let Some(stale) = self.current.take() {
            self.remove_best_effort(&stale);
        }
    }

    /// Shutdown cleanup: every tracked temp file is removed.
    pub fn dispose_all(&mut self) {
        if let Some(current) = self.current.take() {
            self.remove_best_effort(&current);
        }
        if let Some(previous) = self.previous.take() {
            self.remove_best_effort(&previous);
        }
    }

    fn alloc(&self, prefix: &str) -> io::Result<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(ARTIFACT_SUFFIX);
        let file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (_handle, path) = file.keep().map_err(|err| err.error)?;
        Ok(path)
    }

    fn remove_best_effort(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                let _ = self.events.send(JobEvent::Info(InfoEvent::CleanupFailed {
                    path: path.to_path_buf(),
                    error: err.to_string(),
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn store_in(dir: &Path) -> ArtifactStore {
        let (tx, _rx) = mpsc::unbounded_channel();
        ArtifactStore::in_dir(dir, tx)
    }

    #[test]
    fn commit_rotates_and_deletes_the_displaced_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        fs::write(&source, b"AAA").unwrap();
        let mut store = store_in(dir.path());

        store.snapshot_previous(&source).unwrap();
        let first = store.create_output_target().unwrap();
        fs::write(&first, b"BBB").unwrap();
        store.commit(first.clone());
        assert_eq!(store.current(), Some(first.as_path()));

        store.snapshot_previous(&first).unwrap();
        let second = store.create_output_target().unwrap();
        fs::write(&second, b"CCC").unwrap();
        store.commit(second.clone());

        assert_eq!(store.current(), Some(second.as_path()));
        assert!(!first.exists(), "displaced output should be deleted");
        assert!(second.exists());
    }

    #[test]
    fn snapshot_copies_bytes_and_replaces_older_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        fs::write(&source, b"generation-1").unwrap();
        let mut store = store_in(dir.path());

        let first = store.snapshot_previous(&source).unwrap();
        assert_eq!(fs::read(&first).unwrap(), b"generation-1");
        assert!(store.undo_available());

        fs::write(&source, b"generation-2").unwrap();
        let second = store.snapshot_previous(&source).unwrap();
        assert!(!first.exists(), "older snapshot should be deleted");
        assert_eq!(fs::read(&second).unwrap(), b"generation-2");
    }

    #[test]
    fn rollback_removes_target_but_keeps_current() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());

        let committed = store.create_output_target().unwrap();
        fs::write(&committed, b"good").unwrap();
        store.commit(committed.clone());

        let doomed = store.create_output_target().unwrap();
        fs::write(&doomed, b"partial garbage").unwrap();
        store.rollback_after_failure(&doomed);

        assert!(!doomed.exists());
        assert_eq!(store.current(), Some(committed.as_path()));
        assert!(committed.exists());
    }

    #[test]
    fn undo_restores_snapshot_bytes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        fs::write(&source, b"before-run").unwrap();
        let mut store = store_in(dir.path());

        store.snapshot_previous(&source).unwrap();
        let output = store.create_output_target().unwrap();
        fs::write(&output, b"after-run").unwrap();
        store.commit(output.clone());

        let restored = store.undo().unwrap().unwrap();
        assert_eq!(fs::read(&restored).unwrap(), b"before-run");
        assert_eq!(store.current(), Some(restored.as_path()));
        assert!(!output.exists(), "displaced current should be deleted");
        assert!(!store.undo_available());

        assert!(store.undo().unwrap().is_none(), "undo is one level deep");
        assert_eq!(store.current(), Some(restored.as_path()));
    }

    #[test]
    fn undo_without_snapshot_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(dir.path());
        assert!(store.undo().unwrap().is_none());
        assert!(store.current().is_none());
    }

    #[test]
    fn clear_current_keeps_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        fs::write(&source, b"kept").unwrap();
        let mut store = store_in(dir.path());

        store.snapshot_previous(&source).unwrap();
        let output = store.create_output_target().unwrap();
        fs::write(&output, b"stale").unwrap();
        store.commit(output.clone());

        store.clear_current();
        assert!(store.current().is_none());
        assert!(!output.exists());
        assert!(store.undo_available());
    }

    #[test]
    fn dispose_all_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        fs::write(&source, b"x").unwrap();
        let mut store = store_in(dir.path());

        let snapshot = store.snapshot_previous(&source).unwrap();
        let output = store.create_output_target().unwrap();
        fs::write(&output, b"y").unwrap();
        store.commit(output.clone());

        store.dispose_all();
        assert!(!snapshot.exists());
        assert!(!output.exists());
        assert!(store.current().is_none());
        assert!(!store.undo_available());
    }

    #[test]
    fn failed_deletions_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = ArtifactStore::in_dir(dir.path(), tx);

        // Deleting a file that never existed is silent.
        store.rollback_after_failure(&dir.path().join("ghost.png"));
        assert!(rx.try_recv().is_err());
    }
}
