//! Repository initialization.
//!
//! Produces the version-1 metadata set for a target directory:
//! `1.root.json`, `1.targets.json`, `1.snapshot.json`, `timestamp.json`.

use std::fs;
use std::path::PathBuf;

use rsa::RsaPrivateKey;

use crate::errors::{Error, Result};
use crate::keys;
use crate::meta::{
    codec, expire_in, Key, Role, RoleMap, RootPayload, Signed, SnapshotPayload, TimestampPayload,
};
use crate::ops::{ensure_writable_dir, WriteGuard};
use crate::scan;
use crate::verify::delegate_check;

/// Inputs for the `init` verb.
#[derive(Clone, Debug)]
pub struct InitConfig {
    /// Directory containing the target files.
    pub repository_dir: PathBuf,
    /// Directory the metadata files are written to; created if absent.
    pub output_dir: PathBuf,
    /// Private key files per role; the count must equal the role's
    /// threshold.
    pub key_paths: RoleMap<Vec<PathBuf>>,
    pub thresholds: RoleMap<u32>,
    pub expire_days: u16,
}

/// Initializes a repository's metadata set.
///
/// Every provided key signs its role's document. A document that still
/// misses quorum afterwards is logged as a warning, not an error, so the
/// operator can finish with `sign` -- but with the required one-key-per-
/// threshold-slot inputs the checks pass by construction.
pub fn init(cfg: &InitConfig) -> Result<()> {
    for role in Role::ALL {
        let threshold = *cfg.thresholds.get(role);
        let provided = cfg.key_paths.get(role).len();
        if threshold == 0 {
            return Err(Error::InvalidInput(format!(
                "threshold must be greater than 0 for role {role}"
            )));
        }
        if provided as u64 != u64::from(threshold) {
            return Err(Error::InvalidInput(format!(
                "too few/many private key(s) provided for role {role}: want {threshold}, have {provided}"
            )));
        }
    }

    if ensure_writable_dir(&cfg.output_dir).is_err() {
        log::info!(
            "output dir missing or unwritable, creating {}",
            cfg.output_dir.display()
        );
        fs::create_dir_all(&cfg.output_dir).map_err(|e| Error::io(&cfg.output_dir, e))?;
        ensure_writable_dir(&cfg.output_dir)?;
    }

    // Read all private keys up front; nothing is written if any fails.
    let mut role_keys: RoleMap<Vec<RsaPrivateKey>> = RoleMap::default();
    for role in Role::ALL {
        for path in cfg.key_paths.get(role) {
            role_keys.get_mut(role).push(keys::load_private(path)?);
        }
    }

    let targets_payload = scan::build_targets_payload(&cfg.repository_dir, cfg.expire_days)?;
    let mut targets = Signed::new(targets_payload);
    let mut snapshot = Signed::new(SnapshotPayload::new(expire_in(cfg.expire_days)));
    let mut timestamp = Signed::new(TimestampPayload::new(expire_in(cfg.expire_days)));
    let mut root = Signed::new(RootPayload::new(expire_in(cfg.expire_days)));

    for role in Role::ALL {
        for private in role_keys.get(role) {
            let key = Key::from_public(&private.to_public_key())?;
            root.signed.add_key(key, role)?;
        }
        root.signed.role_keys_mut(role)?.threshold = *cfg.thresholds.get(role);
    }

    for role in Role::ALL {
        for private in role_keys.get(role) {
            match role {
                Role::Root => root.sign_with(private)?,
                Role::Targets => targets.sign_with(private)?,
                Role::Snapshot => snapshot.sign_with(private)?,
                Role::Timestamp => timestamp.sign_with(private)?,
            };
        }
    }

    for role in Role::ALL {
        let checked = match role {
            Role::Root => delegate_check(&root.signed, role, &root),
            Role::Targets => delegate_check(&root.signed, role, &targets),
            Role::Snapshot => delegate_check(&root.signed, role, &snapshot),
            Role::Timestamp => delegate_check(&root.signed, role, &timestamp),
        };
        if let Err(e) = checked {
            log::warn!("verification of freshly signed {role} metadata failed: {e}");
        }
    }

    let mut guard = WriteGuard::new();
    for role in Role::WRITE_ORDER {
        let written = match role {
            Role::Targets => codec::write_atomic(&cfg.output_dir, &targets)?,
            Role::Snapshot => codec::write_atomic(&cfg.output_dir, &snapshot)?,
            Role::Timestamp => codec::write_atomic(&cfg.output_dir, &timestamp)?,
            Role::Root => codec::write_atomic(&cfg.output_dir, &root)?,
        };
        guard.track(written);
    }
    guard.disarm();
    Ok(())
}
