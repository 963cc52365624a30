//! Filesystem locks so two processes never ingest the same namespace at once
//!
//! Locks use flock() through `fs2`; the OS releases them if the process dies.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Lock file for a namespace. Namespaces are already filename-safe.
fn lock_file_path(dir: &Path, namespace: &str) -> PathBuf {
    dir.join(format!("{}.lock", namespace))
}

/// Guard that holds an exclusive lock on one namespace until dropped
pub struct NamespaceLock {
    _file: File,
    path: PathBuf,
}

impl NamespaceLock {
    /// Try to take the lock without blocking
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub fn try_acquire(dir: &Path, namespace: &str) -> Result<Option<Self>> {
        let lock_path = lock_file_path(dir, namespace);

        fs::create_dir_all(dir).context("Failed to create lock directory")?;
        let file = File::create(&lock_path).context("Failed to create lock file")?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Acquired namespace lock {:?}", lock_path);
                Ok(Some(Self {
                    _file: file,
                    path: lock_path,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::debug!("Namespace lock {:?} is held elsewhere", lock_path);
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to acquire namespace lock"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NamespaceLock {
    fn drop(&mut self) {
        // the file stays for reuse; closing it releases the flock
        tracing::debug!("Releasing namespace lock {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();

        let guard = NamespaceLock::try_acquire(dir.path(), "acme_widgets_main").unwrap();
        assert!(guard.is_some());
        assert!(dir.path().join("acme_widgets_main.lock").exists());
        drop(guard);

        let again = NamespaceLock::try_acquire(dir.path(), "acme_widgets_main").unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn test_second_holder_is_refused() {
        let dir = TempDir::new().unwrap();
        let held = NamespaceLock::try_acquire(dir.path(), "acme_widgets_main")
            .unwrap()
            .unwrap();

        let path = dir.path().to_path_buf();
        let other = thread::spawn(move || {
            NamespaceLock::try_acquire(&path, "acme_widgets_main").unwrap()
        })
        .join()
        .unwrap();
        assert!(other.is_none());

        // other namespaces are independent
        assert!(
            NamespaceLock::try_acquire(dir.path(), "acme_widgets_dev")
                .unwrap()
                .is_some()
        );
        drop(held);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("locks").join("deeper");
        let guard = NamespaceLock::try_acquire(&nested, "ns").unwrap().unwrap();
        assert_eq!(guard.path(), nested.join("ns.lock"));
    }
}
