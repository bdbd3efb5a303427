//! Incremental republication after target files change.
//!
//! Re-issues targets, snapshot, and timestamp at version+1 with fresh
//! cross-references; root is untouched. The previously published documents
//! must meet their quorum before anything proceeds -- evolving an
//! untrusted repository would launder bad state into good-looking state.

use std::path::PathBuf;

use rsa::RsaPrivateKey;

use crate::errors::{Error, Result};
use crate::keys;
use crate::meta::role_set::RoleSet;
use crate::meta::{codec, expire_in, Role, Signed};
use crate::ops::{ensure_writable_dir, WriteGuard};
use crate::prompt::Confirmer;
use crate::scan;
use crate::verify::{self, delegate_check, diff_targets, TargetChange};

/// Inputs for the `update` verb.
///
/// Allowed key subsets: `{targets}`, `{targets, snapshot}`,
/// `{targets, snapshot, timestamp}`. Roles whose key is omitted are
/// written unsigned and must be completed with `sign` before the
/// repository verifies again.
#[derive(Clone, Debug)]
pub struct UpdateConfig {
    pub repository_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub targets_key: Option<PathBuf>,
    pub snapshot_key: Option<PathBuf>,
    pub timestamp_key: Option<PathBuf>,
    pub expire_days: u16,
    /// Show the diff and quorum warnings and ask before writing.
    pub ask_confirmation: bool,
}

/// The three roles update touches, in write order.
const UPDATED_ROLES: [Role; 3] = [Role::Targets, Role::Snapshot, Role::Timestamp];

pub fn update(cfg: &UpdateConfig, confirmer: &mut dyn Confirmer) -> Result<Vec<TargetChange>> {
    check_key_subset(cfg)?;

    let mut set = RoleSet::load(&cfg.metadata_dir)?;

    // The previous documents must be trusted before they are superseded.
    let root = set.root().signed.clone();
    for role in Role::ALL {
        let checked = match role {
            Role::Root => delegate_check(&root, role, set.root()),
            Role::Targets => delegate_check(&root, role, set.targets()),
            Role::Snapshot => delegate_check(&root, role, set.snapshot()),
            Role::Timestamp => delegate_check(&root, role, set.timestamp()),
        };
        if let Err(e) = checked {
            log::error!("update aborted, no changes were made");
            return Err(Error::InadequatePriorSignatures {
                role,
                detail: e.to_string(),
            });
        }
    }

    let new_targets = scan::build_targets_payload(&cfg.repository_dir, cfg.expire_days)?;
    let changes = diff_targets(&new_targets.targets, &set.targets().signed.targets);
    print!("{}", verify::render_changes(&changes));
    if cfg.ask_confirmation && !confirmer.confirm() {
        return Err(Error::ConfirmationDeclined);
    }

    // Re-issue the three documents: fresh payload for targets, version+1
    // and new expiry everywhere, cross-references re-pinned downstream
    // first so each pin sees the final version of what it points at.
    let old_targets_version = set.targets().signed.version;
    set.set_targets(Signed::new(new_targets));
    set.targets_mut().signed.version = old_targets_version + 1;
    set.set_expires(Role::Targets, expire_in(cfg.expire_days));

    set.clear_signatures(Role::Snapshot);
    let targets_version = set.targets().signed.version;
    set.snapshot_mut().signed.set_targets_version(targets_version);
    set.bump_version(Role::Snapshot);
    set.set_expires(Role::Snapshot, expire_in(cfg.expire_days));

    set.clear_signatures(Role::Timestamp);
    let snapshot_version = set.snapshot().signed.version;
    set.timestamp_mut().signed.set_snapshot_version(snapshot_version);
    set.bump_version(Role::Timestamp);
    set.set_expires(Role::Timestamp, expire_in(cfg.expire_days));

    // Load the supplied keys and verify each is authorized for its role.
    let mut role_keys: Vec<(Role, RsaPrivateKey)> = Vec::new();
    for (role, path) in [
        (Role::Targets, &cfg.targets_key),
        (Role::Snapshot, &cfg.snapshot_key),
        (Role::Timestamp, &cfg.timestamp_key),
    ] {
        let Some(path) = path else {
            log::info!("no key provided for role {role}, skipping signing");
            continue;
        };
        let private = keys::load_private(path)?;
        let keyid = keys::key_id(&private.to_public_key())?;
        if !root.role_keys(role)?.keyids.contains(&keyid) {
            return Err(Error::UnknownKey { role, keyid });
        }
        role_keys.push((role, private));
    }

    for (role, private) in &role_keys {
        match role {
            Role::Targets => set.targets_mut().sign_with(private)?,
            Role::Snapshot => set.snapshot_mut().sign_with(private)?,
            Role::Timestamp => set.timestamp_mut().sign_with(private)?,
            Role::Root => unreachable!("update never signs root"),
        };
    }

    // The fresh signature lists were just created from scratch, but keep
    // the guard: a repeated key ID here would poison the quorum count.
    for role in UPDATED_ROLES {
        let duplicates = match role {
            Role::Targets => set.targets().duplicate_keyids(),
            Role::Snapshot => set.snapshot().duplicate_keyids(),
            Role::Timestamp => set.timestamp().duplicate_keyids(),
            Role::Root => unreachable!(),
        };
        if let Some(keyid) = duplicates.into_iter().next() {
            return Err(Error::DuplicateSignature { role, keyid });
        }
    }

    // Quorum check on the new documents is advisory: the operator may
    // intend to collect the remaining signatures with later `sign` calls.
    for role in UPDATED_ROLES {
        let checked = match role {
            Role::Targets => delegate_check(&root, role, set.targets()),
            Role::Snapshot => delegate_check(&root, role, set.snapshot()),
            Role::Timestamp => delegate_check(&root, role, set.timestamp()),
            Role::Root => unreachable!(),
        };
        if let Err(e) = checked {
            log::warn!("new {role} metadata does not meet quorum yet: {e}");
            println!("Please make sure that the right keys were used, otherwise please perform additional signing to meet the threshold");
            println!("Program will now proceed to write the signature to the metadata file (irreversible)");
            if cfg.ask_confirmation && !confirmer.confirm() {
                println!("Operation aborted, no changes were made");
                return Err(Error::ConfirmationDeclined);
            }
        }
    }

    ensure_writable_dir(&cfg.metadata_dir)?;
    let mut guard = WriteGuard::new();
    for role in UPDATED_ROLES {
        let written = match role {
            Role::Targets => codec::write_atomic(&cfg.metadata_dir, set.targets())?,
            Role::Snapshot => codec::write_atomic(&cfg.metadata_dir, set.snapshot())?,
            Role::Timestamp => codec::write_atomic(&cfg.metadata_dir, set.timestamp())?,
            Role::Root => unreachable!(),
        };
        guard.track(written);
    }
    guard.disarm();
    Ok(changes)
}

fn check_key_subset(cfg: &UpdateConfig) -> Result<()> {
    if cfg.targets_key.is_none() {
        return Err(Error::InvalidInput(
            "targets private key must be provided".to_string(),
        ));
    }
    if cfg.timestamp_key.is_some() && cfg.snapshot_key.is_none() {
        return Err(Error::InvalidInput(
            "snapshot and targets private keys must be provided when the timestamp key is".to_string(),
        ));
    }
    Ok(())
}
