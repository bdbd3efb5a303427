//! Threshold changes for the non-root roles.
//!
//! Root records every role's key set and threshold, so changing a role's
//! threshold means re-issuing root at version+1. Root's own threshold is
//! managed by `change-root-key`, never here.

use std::path::PathBuf;

use crate::errors::{Error, Result};
use crate::keys;
use crate::meta::role_set::load_latest_root;
use crate::meta::{codec, Key, Role};
use crate::ops::ensure_writable_dir;
use crate::verify::delegate_check;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdAction {
    /// Raise the threshold by one and authorize one more key.
    Add,
    /// Lower the threshold by one and revoke one key.
    Reduce,
}

/// Inputs for the `change-threshold` verb.
#[derive(Clone, Debug)]
pub struct ChangeThresholdConfig {
    pub metadata_dir: PathBuf,
    pub action: ThresholdAction,
    /// Role whose threshold changes; root is rejected.
    pub role: Role,
    pub root_key_path: PathBuf,
    /// Key to add (must be private) or revoke (private or public).
    pub role_key_path: PathBuf,
}

pub fn change_threshold(cfg: &ChangeThresholdConfig) -> Result<PathBuf> {
    if cfg.role == Role::Root {
        return Err(Error::InvalidInput(
            "use change-root-key to manage the root role".to_string(),
        ));
    }

    let root_private = keys::load_private(&cfg.root_key_path)?;

    // For `add` the key joins the signer set, so private material is
    // required; for `reduce` the public half is enough to name the key.
    let role_key_bytes = keys::read_key_file(&cfg.role_key_path)?;
    let role_public = match cfg.action {
        ThresholdAction::Add => keys::parse_private(&role_key_bytes)?.to_public_key(),
        ThresholdAction::Reduce => keys::parse_any(&role_key_bytes)?.public(),
    };

    let (mut root, _) = load_latest_root(&cfg.metadata_dir)?;
    delegate_check(&root.signed, Role::Root, &root).map_err(|e| {
        Error::InadequatePriorSignatures {
            role: Role::Root,
            detail: e.to_string(),
        }
    })?;

    let keyid = keys::key_id(&role_public)?;
    match cfg.action {
        ThresholdAction::Add => {
            let entry = root.signed.role_keys_mut(cfg.role)?;
            entry.threshold += 1;
            if entry.keyids.contains(&keyid) {
                return Err(Error::DuplicateKey { keyid });
            }
            root.signed.add_key(Key::from_public(&role_public)?, cfg.role)?;
        }
        ThresholdAction::Reduce => {
            let entry = root.signed.role_keys_mut(cfg.role)?;
            entry.threshold -= 1;
            if entry.threshold == 0 {
                return Err(Error::ThresholdUnderflow { role: cfg.role });
            }
            root.signed.revoke_key(&keyid, cfg.role)?;
        }
    }

    let entry = root.signed.role_keys(cfg.role)?;
    if u64::from(entry.threshold) > entry.keyids.len() as u64 {
        return Err(Error::InvalidInput(format!(
            "threshold {} exceeds the {} key(s) authorized for role {}",
            entry.threshold,
            entry.keyids.len(),
            cfg.role
        )));
    }

    root.signed.version += 1;
    root.clear_signatures();

    let sig = root.sign_with(&root_private)?;
    if !root.signed.role_keys(Role::Root)?.keyids.contains(&sig.keyid) {
        return Err(Error::UnrecognizedKey {
            role: Role::Root,
            keyid: sig.keyid,
        });
    }

    if let Err(e) = delegate_check(&root.signed, Role::Root, &root) {
        log::warn!("new root metadata does not meet quorum yet: {e}");
    }

    ensure_writable_dir(&cfg.metadata_dir)?;
    let written = codec::write_atomic(&cfg.metadata_dir, &root)?;
    log::info!("root re-issued at version {}", root.signed.version);
    Ok(written)
}
