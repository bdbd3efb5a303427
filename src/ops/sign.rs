//! Detached signing of an existing role document.
//!
//! Adds one signature to the latest document of a role and writes the file
//! back under its current version -- signing never bumps versions. This is
//! how a second (third, ...) key holder completes a quorum that `init`,
//! `update`, or a root rotation left short.

use std::path::{Path, PathBuf};

use rsa::RsaPrivateKey;

use crate::errors::{Error, Result};
use crate::keys;
use crate::meta::role_set::{load_latest_root, versioned_role_files};
use crate::meta::{codec, Payload, Role, RootPayload, SnapshotPayload, TargetsPayload, TimestampPayload};
use crate::ops::ensure_writable_dir;
use crate::prompt::Confirmer;
use crate::verify::delegate_check;

/// Inputs for the `sign` verb.
#[derive(Clone, Debug)]
pub struct SignConfig {
    pub metadata_dir: PathBuf,
    pub role: Role,
    pub key_path: PathBuf,
    /// Bypass the "key ID is listed in root for this role" precondition.
    /// Needed e.g. to complete continuity after a root key rotation, when
    /// the predecessor's key is no longer listed by the new root. Later
    /// verification still reports insufficiency faithfully.
    pub forced: bool,
}

pub fn sign(cfg: &SignConfig, confirmer: &mut dyn Confirmer) -> Result<PathBuf> {
    let private = keys::load_private(&cfg.key_path)?;
    let (root, root_path) = load_latest_root(&cfg.metadata_dir)?;

    match cfg.role {
        Role::Root => {
            // Root signs itself; re-sign the loaded latest root in place.
            sign_document::<RootPayload>(cfg, &root.signed, &root_path, &private, confirmer)
        }
        Role::Targets => {
            let path = latest_path(&cfg.metadata_dir, cfg.role)?;
            sign_document::<TargetsPayload>(cfg, &root.signed, &path, &private, confirmer)
        }
        Role::Snapshot => {
            let path = latest_path(&cfg.metadata_dir, cfg.role)?;
            sign_document::<SnapshotPayload>(cfg, &root.signed, &path, &private, confirmer)
        }
        Role::Timestamp => {
            let path = cfg
                .metadata_dir
                .join(codec::metadata_filename(Role::Timestamp, 0));
            sign_document::<TimestampPayload>(cfg, &root.signed, &path, &private, confirmer)
        }
    }
}

fn latest_path(dir: &Path, role: Role) -> Result<PathBuf> {
    let files = versioned_role_files(dir, role)?;
    files.last().map(|(_, p)| p.clone()).ok_or_else(|| {
        Error::io(
            dir,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no {role} metadata file found"),
            ),
        )
    })
}

fn sign_document<T: Payload>(
    cfg: &SignConfig,
    root: &RootPayload,
    path: &Path,
    private: &RsaPrivateKey,
    confirmer: &mut dyn Confirmer,
) -> Result<PathBuf> {
    let mut doc: crate::meta::Signed<T> = codec::load(path)?;
    let sig = doc.sign_with(private)?;

    if let Some(keyid) = doc.duplicate_keyids().into_iter().next() {
        return Err(Error::DuplicateSignature {
            role: cfg.role,
            keyid,
        });
    }

    if !cfg.forced && !root.role_keys(cfg.role)?.keyids.contains(&sig.keyid) {
        log::error!("signing operation aborted");
        return Err(Error::UnrecognizedKey {
            role: cfg.role,
            keyid: sig.keyid,
        });
    }

    if let Err(e) = delegate_check(root, cfg.role, &doc) {
        log::warn!("{} metadata still short of quorum: {e}", cfg.role);
        println!("fail to verify metadata signature for role {}: {e}", cfg.role);
        println!("Please perform additional signing to meet the threshold, program will now proceed to write the signature to the metadata file (irreversible)");
        if !confirmer.confirm() {
            println!("Operation aborted, no changes were made");
            return Err(Error::ConfirmationDeclined);
        }
    }

    ensure_writable_dir(&cfg.metadata_dir)?;
    let written = codec::write_atomic(&cfg.metadata_dir, &doc)?;
    log::info!(
        "signing operation completed for role {} -> {}",
        cfg.role,
        written.display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Assent;

    #[test]
    fn missing_key_file_is_io_error() {
        let cfg = SignConfig {
            metadata_dir: PathBuf::from("meta"),
            role: Role::Targets,
            key_path: PathBuf::from("/nonexistent/key.pem"),
            forced: false,
        };
        assert!(matches!(sign(&cfg, &mut Assent), Err(Error::Io { .. })));
    }
}
