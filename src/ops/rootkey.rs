//! Root key set management.
//!
//! Adds a key to or removes a key from root's own key set and re-issues
//! root at version+1 with a fresh expiry and threshold. Continuity demands
//! endorsement by the *previous* key set too: for `add` the new key
//! co-signs immediately; after a `remove` the operator may still need
//! `sign --forced` with a remaining predecessor key to complete the hop.

use std::path::PathBuf;

use crate::errors::{Error, Result};
use crate::keys;
use crate::meta::role_set::load_latest_root;
use crate::meta::{codec, expire_in, Key, Role};
use crate::ops::ensure_writable_dir;
use crate::verify::delegate_check;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootKeyAction {
    Add,
    Remove,
}

/// Inputs for the `change-root-key` verb.
#[derive(Clone, Debug)]
pub struct ChangeRootKeyConfig {
    pub metadata_dir: PathBuf,
    pub action: RootKeyAction,
    /// Root private key that signs the re-issued document.
    pub signing_key_path: PathBuf,
    /// Key to add (must be private) or remove (private or public).
    pub input_key_path: PathBuf,
    pub expire_days: u16,
    /// Root threshold recorded in the new document.
    pub threshold: u32,
}

pub fn change_root_key(cfg: &ChangeRootKeyConfig) -> Result<PathBuf> {
    if cfg.threshold == 0 {
        return Err(Error::InvalidInput(
            "threshold must be greater than 0".to_string(),
        ));
    }

    let (mut root, _) = load_latest_root(&cfg.metadata_dir)?;
    delegate_check(&root.signed, Role::Root, &root).map_err(|e| {
        Error::InadequatePriorSignatures {
            role: Role::Root,
            detail: e.to_string(),
        }
    })?;

    let signing_private = keys::load_private(&cfg.signing_key_path)?;

    // The added key must be private (it co-signs below); the removed key
    // only needs to be nameable.
    let mut added_private = None;
    match cfg.action {
        RootKeyAction::Add => {
            let private = keys::load_private(&cfg.input_key_path)?;
            let keyid = keys::key_id(&private.to_public_key())?;
            if root.signed.role_keys(Role::Root)?.keyids.contains(&keyid) {
                return Err(Error::DuplicateKey { keyid });
            }
            root.signed
                .add_key(Key::from_public(&private.to_public_key())?, Role::Root)?;
            added_private = Some(private);
        }
        RootKeyAction::Remove => {
            if root.signed.role_keys(Role::Root)?.keyids.len() == 1 {
                return Err(Error::InvalidInput(
                    "cannot remove the last remaining root key".to_string(),
                ));
            }
            let public = keys::load_any(&cfg.input_key_path)?.public();
            let keyid = keys::key_id(&public)?;
            root.signed.revoke_key(&keyid, Role::Root)?;
        }
    }

    let entry = root.signed.role_keys_mut(Role::Root)?;
    if u64::from(cfg.threshold) > entry.keyids.len() as u64 {
        return Err(Error::InvalidInput(format!(
            "threshold {} exceeds the {} remaining root key(s)",
            cfg.threshold,
            entry.keyids.len()
        )));
    }
    entry.threshold = cfg.threshold;

    root.signed.version += 1;
    root.signed.expires = expire_in(cfg.expire_days);
    root.clear_signatures();

    let sig = root.sign_with(&signing_private)?;
    if !root.signed.role_keys(Role::Root)?.keyids.contains(&sig.keyid) {
        return Err(Error::UnrecognizedKey {
            role: Role::Root,
            keyid: sig.keyid,
        });
    }

    // Co-sign with the added key so the new root endorses itself under its
    // own key set right away (continuity under the new set).
    if let Some(private) = added_private {
        let new_keyid = keys::key_id(&private.to_public_key())?;
        if new_keyid != sig.keyid {
            let new_sig = root.sign_with(&private)?;
            if !root
                .signed
                .role_keys(Role::Root)?
                .keyids
                .contains(&new_sig.keyid)
            {
                return Err(Error::UnrecognizedKey {
                    role: Role::Root,
                    keyid: new_sig.keyid,
                });
            }
        }
    }

    if let Err(e) = delegate_check(&root.signed, Role::Root, &root) {
        // Additional co-signatures may still be required via `sign`.
        log::warn!("new root metadata does not meet quorum yet: {e}");
    }

    ensure_writable_dir(&cfg.metadata_dir)?;
    let written = codec::write_atomic(&cfg.metadata_dir, &root)?;
    log::info!("root re-issued at version {}", root.signed.version);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threshold_rejected() {
        let cfg = ChangeRootKeyConfig {
            metadata_dir: PathBuf::from("meta"),
            action: RootKeyAction::Add,
            signing_key_path: PathBuf::from("root.pem"),
            input_key_path: PathBuf::from("new.pem"),
            expire_days: 365,
            threshold: 0,
        };
        let err = change_root_key(&cfg).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
