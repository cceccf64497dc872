use crate::error::FleetError;
use anyhow::Context;
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive advisory lock on one inventory file, held for the duration of a
/// mutating invocation. The lock file names its holder while held and is
/// emptied on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

/// `inventory.json` is guarded by `inventory.json.lock` beside it.
pub fn lock_path_for(inventory: &Path) -> PathBuf {
    let mut name = inventory
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("inventory"));
    name.push(".lock");
    inventory.with_file_name(name)
}

impl RunLock {
    /// Locks the inventory at `inventory` on behalf of `command`.
    pub fn for_inventory(inventory: &Path, command: &str) -> anyhow::Result<Self> {
        Self::acquire(&lock_path_for(inventory), command)
    }

    /// `Ok(None)` when another process holds the lock.
    pub fn try_acquire(path: &Path, command: &str) -> anyhow::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create lock directory")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("open lock {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                let lock = Self {
                    path: path.to_path_buf(),
                    file,
                };
                lock.write_holder(command)
                    .with_context(|| format!("record lock holder in {}", path.display()))?;
                debug!(path = %path.display(), command, "acquired run lock");
                Ok(Some(lock))
            }
            Err(err) if is_lock_held(&err) => Ok(None),
            Err(err) => Err(err).context("lock file exclusively"),
        }
    }

    /// Fails with [`FleetError::LockHeld`] instead of returning `None`.
    pub fn acquire(path: &Path, command: &str) -> anyhow::Result<Self> {
        match Self::try_acquire(path, command)? {
            Some(lock) => Ok(lock),
            None => Err(FleetError::LockHeld {
                path: path.to_path_buf(),
                holder: read_holder(path).unwrap_or_else(|| "unknown holder".to_string()),
            }
            .into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_holder(&self, command: &str) -> std::io::Result<()> {
        let mut file = &self.file;
        file.set_len(0)?;
        writeln!(file, "pid {} {command}", std::process::id())?;
        file.flush()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = self.file.unlock();
    }
}

/// Holder line of a lock file, if it names one.
pub fn read_holder(path: &Path) -> Option<String> {
    let mut contents = String::new();
    File::open(path).ok()?.read_to_string(&mut contents).ok()?;
    let holder = contents.lines().next()?.trim();
    (!holder.is_empty()).then(|| holder.to_string())
}

fn is_lock_held(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return true;
    }
    // ERROR_LOCK_VIOLATION on Windows.
    matches!(err.raw_os_error(), Some(33))
}
