//! The in-memory aggregation of the four role documents.
//!
//! A [`RoleSet`] is always constructed from a metadata directory. For each
//! versioned role the file with the greatest decimal version prefix wins;
//! a matching file whose prefix does not parse aborts the load. Timestamp
//! comes from the fixed name `timestamp.json`. The full ascending list of
//! root files is retained for the continuity walk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};
use crate::meta::codec;
use crate::meta::{
    Payload, Role, RootPayload, Signature, Signed, SnapshotPayload, TargetsPayload,
    TimestampPayload,
};

/// Latest document per role plus root history.
#[derive(Clone, Debug)]
pub struct RoleSet {
    root: Signed<RootPayload>,
    targets: Signed<TargetsPayload>,
    snapshot: Signed<SnapshotPayload>,
    timestamp: Signed<TimestampPayload>,
    /// Paths of all root versions, ascending by version prefix.
    root_paths: Vec<PathBuf>,
    /// Path the latest document of each role was loaded from.
    root_path: PathBuf,
    targets_path: PathBuf,
    snapshot_path: PathBuf,
    timestamp_path: PathBuf,
}

/// All files for a versioned role in `dir`, ascending by version prefix.
///
/// Only names of the exact shape `<decimal>.<role>.json` participate; a
/// file with the right suffix but an unparseable prefix fails the whole
/// listing.
pub fn versioned_role_files(dir: &Path, role: Role) -> Result<Vec<(u64, PathBuf)>> {
    let suffix = format!(".{}.json", role.name());
    let mut files = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        if !entry.file_type().map_err(|e| Error::io(dir, e))?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(prefix) = name.strip_suffix(&suffix) else {
            continue;
        };
        let version: u64 = prefix.parse().map_err(|_| {
            Error::Decode(format!(
                "cannot parse version prefix of metadata file: {name}"
            ))
        })?;
        files.push((version, entry.path()));
    }
    files.sort_by_key(|(version, _)| *version);
    Ok(files)
}

fn latest_versioned<T: Payload>(dir: &Path) -> Result<(Signed<T>, PathBuf)> {
    let files = versioned_role_files(dir, T::ROLE)?;
    let Some((_, path)) = files.last() else {
        return Err(Error::io(
            dir,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no {} metadata file found", T::ROLE),
            ),
        ));
    };
    Ok((codec::load(path)?, path.clone()))
}

/// Loads the latest root document and its path from `dir`.
pub fn load_latest_root(dir: &Path) -> Result<(Signed<RootPayload>, PathBuf)> {
    latest_versioned::<RootPayload>(dir)
}

impl RoleSet {
    /// Loads the latest document of every role from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let root_files = versioned_role_files(dir, Role::Root)?;
        let Some((_, root_path)) = root_files.last().cloned() else {
            return Err(Error::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no root metadata file found"),
            ));
        };
        let root = codec::load(&root_path)?;
        let (targets, targets_path) = latest_versioned::<TargetsPayload>(dir)?;
        let (snapshot, snapshot_path) = latest_versioned::<SnapshotPayload>(dir)?;

        let timestamp_path = dir.join(codec::metadata_filename(Role::Timestamp, 0));
        let timestamp = codec::load(&timestamp_path)?;

        Ok(RoleSet {
            root,
            targets,
            snapshot,
            timestamp,
            root_paths: root_files.into_iter().map(|(_, p)| p).collect(),
            root_path,
            targets_path,
            snapshot_path,
            timestamp_path,
        })
    }

    pub fn root(&self) -> &Signed<RootPayload> {
        &self.root
    }

    pub fn targets(&self) -> &Signed<TargetsPayload> {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut Signed<TargetsPayload> {
        &mut self.targets
    }

    pub fn snapshot(&self) -> &Signed<SnapshotPayload> {
        &self.snapshot
    }

    pub fn snapshot_mut(&mut self) -> &mut Signed<SnapshotPayload> {
        &mut self.snapshot
    }

    pub fn timestamp(&self) -> &Signed<TimestampPayload> {
        &self.timestamp
    }

    pub fn timestamp_mut(&mut self) -> &mut Signed<TimestampPayload> {
        &mut self.timestamp
    }

    /// Replaces the targets document wholesale (update keeps the freshly
    /// scanned payload rather than mutating the loaded one).
    pub fn set_targets(&mut self, targets: Signed<TargetsPayload>) {
        self.targets = targets;
    }

    /// Path the latest document of `role` was loaded from.
    pub fn path(&self, role: Role) -> &Path {
        match role {
            Role::Root => &self.root_path,
            Role::Targets => &self.targets_path,
            Role::Snapshot => &self.snapshot_path,
            Role::Timestamp => &self.timestamp_path,
        }
    }

    /// All root file paths, ascending by version.
    pub fn root_paths(&self) -> &[PathBuf] {
        &self.root_paths
    }

    pub fn clear_signatures(&mut self, role: Role) {
        match role {
            Role::Root => self.root.clear_signatures(),
            Role::Targets => self.targets.clear_signatures(),
            Role::Snapshot => self.snapshot.clear_signatures(),
            Role::Timestamp => self.timestamp.clear_signatures(),
        }
    }

    /// Increments the document version of `role` by one.
    pub fn bump_version(&mut self, role: Role) {
        match role {
            Role::Root => self.root.signed.version += 1,
            Role::Targets => self.targets.signed.version += 1,
            Role::Snapshot => self.snapshot.signed.version += 1,
            Role::Timestamp => self.timestamp.signed.version += 1,
        }
    }

    pub fn set_expires(&mut self, role: Role, expires: time::OffsetDateTime) {
        match role {
            Role::Root => self.root.signed.set_expires(expires),
            Role::Targets => self.targets.signed.set_expires(expires),
            Role::Snapshot => self.snapshot.signed.set_expires(expires),
            Role::Timestamp => self.timestamp.signed.set_expires(expires),
        }
    }

    pub fn add_signature(&mut self, role: Role, sig: Signature) {
        match role {
            Role::Root => self.root.signatures.push(sig),
            Role::Targets => self.targets.signatures.push(sig),
            Role::Snapshot => self.snapshot.signatures.push(sig),
            Role::Timestamp => self.timestamp.signatures.push(sig),
        }
    }
}
