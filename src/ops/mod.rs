//! The operator-facing operations.
//!
//! Each operation is a single foreground call: it loads what it needs,
//! validates before touching disk, mutates in memory, and persists through
//! the codec. Any file an operation created is deleted again if the
//! operation fails partway -- the metadata directory either advances as a
//! whole or not at all.

mod init;
mod keygen;
mod rootkey;
mod sign;
mod threshold;
mod update;
mod verify;

pub use init::{init, InitConfig};
pub use keygen::{keygen, KeygenConfig};
pub use rootkey::{change_root_key, ChangeRootKeyConfig, RootKeyAction};
pub use sign::{sign, SignConfig};
pub use threshold::{change_threshold, ChangeThresholdConfig, ThresholdAction};
pub use update::{update, UpdateConfig};
pub use verify::verify_repository;

use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};

/// Deletes the files an operation wrote unless it ran to completion.
///
/// Track every path as soon as its write succeeds; call [`disarm`] after
/// the last one. Dropping an armed guard removes the tracked files.
///
/// [`disarm`]: WriteGuard::disarm
pub(crate) struct WriteGuard {
    created: Vec<PathBuf>,
    armed: bool,
}

impl WriteGuard {
    pub(crate) fn new() -> Self {
        WriteGuard {
            created: Vec::new(),
            armed: true,
        }
    }

    pub(crate) fn track(&mut self, path: PathBuf) {
        self.created.push(path);
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for path in &self.created {
            if let Err(e) = std::fs::remove_file(path) {
                log::warn!("rollback: cannot remove {}: {e}", path.display());
            } else {
                log::info!("rollback: removed {}", path.display());
            }
        }
    }
}

/// Probes that `dir` exists and is writable by creating and dropping an
/// anonymous temporary file in it.
pub(crate) fn ensure_writable_dir(dir: &Path) -> Result<()> {
    tempfile::tempfile_in(dir)
        .map(drop)
        .map_err(|e| Error::io(dir, e))
}
