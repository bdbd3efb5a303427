//! Trust rules for the metadata set.
//!
//! Four layered checks, composed by the operations:
//!
//! 1. **Delegate check** -- a role document is sufficient iff it carries at
//!    least `threshold` signatures from distinct keys in the authoritative
//!    root's key set for that role, each valid over the document's
//!    canonical bytes. Signatures under unknown key IDs are ignored.
//! 2. **Expiry check** -- the signed expiry must lie strictly in the
//!    future. Order: root, timestamp, snapshot, targets.
//! 3. **Cross-reference check** -- timestamp pins the snapshot version,
//!    snapshot pins the targets version.
//! 4. **Root continuity** -- every root version must be endorsed to
//!    threshold both by its predecessor's key set and by its own.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use crate::errors::{Error, Result};
use crate::keys;
use crate::meta::role_set::RoleSet;
use crate::meta::{codec, Payload, Role, RootPayload, Signed, TargetFile};
use crate::scan;

/// Counts unique valid signatures on `doc` from keys authorized for `role`
/// by `root`. Returns the count, or [`Error::InadequateSignatures`] when it
/// falls short of the role's threshold.
pub fn delegate_check<T: Payload>(
    root: &RootPayload,
    role: Role,
    doc: &Signed<T>,
) -> Result<usize> {
    let role_keys = root.role_keys(role)?;
    let message = doc.canonical_bytes()?;

    let mut verified: BTreeSet<&str> = BTreeSet::new();
    for sig in &doc.signatures {
        if !role_keys.keyids.iter().any(|k| k == &sig.keyid) {
            // Not authorized for this role; ignored, not an error.
            continue;
        }
        if verified.contains(sig.keyid.as_str()) {
            continue;
        }
        let Some(key) = root.keys.get(&sig.keyid) else {
            log::warn!("root lists keyid {} without key material", sig.keyid);
            continue;
        };
        let Ok(raw) = hex::decode(&sig.sig) else {
            continue;
        };
        let public = key.public_key()?;
        if keys::verify(&public, &message, &raw) {
            verified.insert(sig.keyid.as_str());
        }
    }

    let have = verified.len();
    let need = role_keys.threshold;
    if (have as u64) < u64::from(need) {
        return Err(Error::InadequateSignatures { role, have, need });
    }
    Ok(have)
}

/// Fails with [`Error::Expired`] unless the document expires strictly in
/// the future.
pub fn check_expiry<T: Payload>(doc: &Signed<T>, now: OffsetDateTime) -> Result<()> {
    let expires = doc.signed.expires();
    if expires <= now {
        return Err(Error::Expired {
            role: T::ROLE,
            expires,
        });
    }
    Ok(())
}

/// Timestamp must pin the current snapshot version, snapshot the current
/// targets version.
pub fn check_cross_references(set: &RoleSet) -> Result<()> {
    let snapshot_version = set.snapshot().signed.version;
    let pinned = set.timestamp().signed.snapshot_version().unwrap_or(0);
    if pinned != snapshot_version {
        return Err(Error::CrossRef {
            entry: "snapshot.json".to_string(),
            want: snapshot_version,
            got: pinned,
        });
    }

    let targets_version = set.targets().signed.version;
    let pinned = set.snapshot().signed.targets_version().unwrap_or(0);
    if pinned != targets_version {
        return Err(Error::CrossRef {
            entry: "targets.json".to_string(),
            want: targets_version,
            got: pinned,
        });
    }
    Ok(())
}

/// Walks the root version chain in ascending order.
///
/// The first root must be self-sufficient. Every later root must pass the
/// delegate check under both its predecessor and itself. A failed hop
/// aborts with [`Error::KeyContinuity`] naming the offending version.
pub fn check_root_continuity(root_paths: &[PathBuf]) -> Result<()> {
    let mut iter = root_paths.iter();
    let Some(first) = iter.next() else {
        return Err(Error::InvalidInput(
            "root continuity requires at least one root file".to_string(),
        ));
    };

    let mut previous: Signed<RootPayload> = codec::load(first)?;
    delegate_check(&previous.signed, Role::Root, &previous).map_err(|e| {
        Error::KeyContinuity {
            version: previous.signed.version,
            detail: e.to_string(),
        }
    })?;

    for path in iter {
        let current: Signed<RootPayload> = codec::load(path)?;
        let version = current.signed.version;
        delegate_check(&previous.signed, Role::Root, &current).map_err(|e| {
            Error::KeyContinuity {
                version,
                detail: format!("not endorsed by predecessor key set: {e}"),
            }
        })?;
        delegate_check(&current.signed, Role::Root, &current).map_err(|e| {
            Error::KeyContinuity {
                version,
                detail: format!("not endorsed by own key set: {e}"),
            }
        })?;
        previous = current;
    }
    Ok(())
}

/// One row of the verification report.
#[derive(Debug)]
pub struct RoleReport {
    pub role: Role,
    pub path: PathBuf,
    pub threshold: u32,
    pub keyids: Vec<String>,
    pub expires: OffsetDateTime,
    pub valid: bool,
    pub errors: Vec<Error>,
}

/// A changed or newly added target path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetChange {
    pub path: String,
    /// Descriptor in the published targets document; `None` for new files.
    pub old: Option<TargetFile>,
    pub new: TargetFile,
}

/// Full verification report: one row per role plus the target diff.
#[derive(Debug)]
pub struct RepositoryReport {
    pub roles: Vec<RoleReport>,
    pub changes: Vec<TargetChange>,
}

impl RepositoryReport {
    pub fn all_valid(&self) -> bool {
        self.roles.iter().all(|r| r.valid)
    }

    /// The first recorded failure, in verification order.
    pub fn into_first_error(self) -> Option<Error> {
        self.roles
            .into_iter()
            .flat_map(|r| r.errors)
            .next()
    }
}

/// Paths whose descriptor differs between a fresh scan and the published
/// targets document, sorted by path. Paths only present in the published
/// document are not reported.
pub fn diff_targets(
    new: &std::collections::BTreeMap<String, TargetFile>,
    old: &std::collections::BTreeMap<String, TargetFile>,
) -> Vec<TargetChange> {
    let mut changes = Vec::new();
    for (path, descriptor) in new {
        match old.get(path) {
            Some(previous) if previous == descriptor => {}
            previous => changes.push(TargetChange {
                path: path.clone(),
                old: previous.cloned(),
                new: descriptor.clone(),
            }),
        }
    }
    changes
}

/// Renders the diff the way the operator sees it before confirming an
/// update.
pub fn render_changes(changes: &[TargetChange]) -> String {
    let mut out = format!("A total of {} new change(s) detected:\n", changes.len());
    out.push_str("    No.  Filepath                        Length (old -> new)\n");
    for (i, change) in changes.iter().enumerate() {
        let old_len = change
            .old
            .as_ref()
            .map(|f| f.length.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "    {}.  {:<30}  {} -> {}\n",
            i + 1,
            change.path,
            old_len,
            change.new.length
        ));
    }
    out
}

/// Builds the per-role report (delegate + expiry checks under the latest
/// root) and the target diff against a fresh scan of `repo_dir`.
pub fn report(set: &RoleSet, repo_dir: &Path) -> Result<RepositoryReport> {
    let now = OffsetDateTime::now_utc();
    let root = &set.root().signed;

    let mut roles = Vec::with_capacity(Role::VERIFY_ORDER.len());
    for role in Role::VERIFY_ORDER {
        let mut errors = Vec::new();

        let quorum = match role {
            Role::Root => delegate_check(root, role, set.root()),
            Role::Targets => delegate_check(root, role, set.targets()),
            Role::Snapshot => delegate_check(root, role, set.snapshot()),
            Role::Timestamp => delegate_check(root, role, set.timestamp()),
        };
        if let Err(e) = quorum {
            log::warn!("{role} metadata failed verification: {e}");
            errors.push(e);
        }

        let expiry = match role {
            Role::Root => check_expiry(set.root(), now),
            Role::Targets => check_expiry(set.targets(), now),
            Role::Snapshot => check_expiry(set.snapshot(), now),
            Role::Timestamp => check_expiry(set.timestamp(), now),
        };
        if let Err(e) = expiry {
            log::warn!("{e}");
            errors.push(e);
        }

        let role_keys = root.role_keys(role)?;
        let expires = match role {
            Role::Root => set.root().signed.expires(),
            Role::Targets => set.targets().signed.expires(),
            Role::Snapshot => set.snapshot().signed.expires(),
            Role::Timestamp => set.timestamp().signed.expires(),
        };
        roles.push(RoleReport {
            role,
            path: set.path(role).to_path_buf(),
            threshold: role_keys.threshold,
            keyids: role_keys.keyids.clone(),
            expires,
            valid: errors.is_empty(),
            errors,
        });
    }

    let fresh = scan::build_targets_payload(repo_dir, 1)?;
    let changes = diff_targets(&fresh.targets, &set.targets().signed.targets);

    Ok(RepositoryReport { roles, changes })
}
