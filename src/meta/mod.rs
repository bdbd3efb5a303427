//! Role documents and their signed envelope.
//!
//! The on-disk shape follows the TUF metadata format: a document is a
//! [`Signed`] envelope holding a role-specific payload plus a list of
//! [`Signature`]s computed over the payload's canonical byte form (see
//! [`codec`]). All maps are `BTreeMap` so serialization order is stable.
//!
//! | Payload | File name | Carries |
//! |---------|-----------|---------|
//! | [`RootPayload`] | `<version>.root.json` | per-role key sets and thresholds |
//! | [`TargetsPayload`] | `<version>.targets.json` | path -> target descriptor map |
//! | [`SnapshotPayload`] | `<version>.snapshot.json` | authoritative targets version |
//! | [`TimestampPayload`] | `timestamp.json` | authoritative snapshot version |

pub mod codec;
pub mod role_set;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use time::OffsetDateTime;

use crate::errors::{Error, Result};
use crate::keys;

/// Version of the metadata format written into every payload.
pub const SPEC_VERSION: &str = "1.0.31";

/// The four top-level roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Root,
    Targets,
    Snapshot,
    Timestamp,
}

impl Role {
    /// All roles, root first.
    pub const ALL: [Role; 4] = [Role::Root, Role::Targets, Role::Snapshot, Role::Timestamp];

    /// Canonical order for verification: trust flows root -> timestamp ->
    /// snapshot -> targets.
    pub const VERIFY_ORDER: [Role; 4] =
        [Role::Root, Role::Timestamp, Role::Snapshot, Role::Targets];

    /// Canonical order for initial writes; root last so a failed write of
    /// the delegating document never leaves orphan delegates behind.
    pub const WRITE_ORDER: [Role; 4] =
        [Role::Targets, Role::Snapshot, Role::Timestamp, Role::Root];

    /// Lower-case wire name (`"root"`, `"targets"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Role::Root => "root",
            Role::Targets => "targets",
            Role::Snapshot => "snapshot",
            Role::Timestamp => "timestamp",
        }
    }

    /// Whether this role's file carries a `<version>.` prefix. Timestamp is
    /// always written to the fixed name `timestamp.json`.
    pub fn versioned_filename(self) -> bool {
        !matches!(self, Role::Timestamp)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "root" => Ok(Role::Root),
            "targets" => Ok(Role::Targets),
            "snapshot" => Ok(Role::Snapshot),
            "timestamp" => Ok(Role::Timestamp),
            other => Err(Error::InvalidInput(format!("unknown role: {other}"))),
        }
    }
}

/// One value per role. Used wherever an operation carries per-role
/// configuration (key paths, thresholds, loaded keys).
#[derive(Clone, Debug, Default)]
pub struct RoleMap<T> {
    pub root: T,
    pub targets: T,
    pub snapshot: T,
    pub timestamp: T,
}

impl<T> RoleMap<T> {
    pub fn get(&self, role: Role) -> &T {
        match role {
            Role::Root => &self.root,
            Role::Targets => &self.targets,
            Role::Snapshot => &self.snapshot,
            Role::Timestamp => &self.timestamp,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Root => &mut self.root,
            Role::Targets => &mut self.targets,
            Role::Snapshot => &mut self.snapshot,
            Role::Timestamp => &mut self.timestamp,
        }
    }
}

/// A public key as recorded in the root document.
///
/// The key ID is the SHA-256 of this object's canonical byte form, so two
/// encodings of the same public key always yield the same ID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyVal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVal {
    /// PKIX PEM encoding of the public key.
    pub public: String,
}

impl Key {
    /// Wraps an RSA public key in its metadata representation.
    pub fn from_public(public: &rsa::RsaPublicKey) -> Result<Self> {
        Ok(Key {
            keytype: "rsa".to_string(),
            scheme: "rsassa-pss-sha256".to_string(),
            keyval: KeyVal {
                public: keys::export_public(public)?,
            },
        })
    }

    /// Derives the stable key identifier for this key.
    pub fn key_id(&self) -> Result<String> {
        let canonical = codec::to_canonical_bytes(self)?;
        Ok(hex::encode(sha2::Sha256::digest(&canonical)))
    }

    /// Parses the embedded PEM back into an RSA public key.
    pub fn public_key(&self) -> Result<rsa::RsaPublicKey> {
        keys::parse_public(self.keyval.public.as_bytes())
    }
}

/// A single signature over a payload's canonical bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Key ID (as listed in root) of the key that produced this signature.
    pub keyid: String,
    /// Hex-encoded RSASSA-PSS-SHA256 signature.
    pub sig: String,
}

/// A signed role document: payload plus signature list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signed: T,
    pub signatures: Vec<Signature>,
}

impl<T: Payload> Signed<T> {
    /// Wraps a payload with an empty signature list.
    pub fn new(signed: T) -> Self {
        Signed {
            signed,
            signatures: Vec::new(),
        }
    }

    /// The canonical byte form of the payload; this is what signatures are
    /// computed over and verified against.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        codec::to_canonical_bytes(&self.signed)
    }

    /// Signs the payload with `key` and appends the signature. Does not
    /// deduplicate; callers that must reject duplicate key IDs check the
    /// list afterwards.
    pub fn sign_with(&mut self, key: &rsa::RsaPrivateKey) -> Result<Signature> {
        let bytes = self.canonical_bytes()?;
        let raw = keys::sign(key, &bytes);
        let sig = Signature {
            keyid: keys::key_id(&key.to_public_key())?,
            sig: hex::encode(raw),
        };
        self.signatures.push(sig.clone());
        Ok(sig)
    }

    /// Drops all signatures, e.g. before re-issuing at a new version.
    pub fn clear_signatures(&mut self) {
        self.signatures.clear();
    }

    /// Key IDs that appear more than once in the signature list.
    pub fn duplicate_keyids(&self) -> Vec<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for sig in &self.signatures {
            *counts.entry(sig.keyid.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(k, _)| k.to_string())
            .collect()
    }
}

/// Shared surface of the four payload types.
pub trait Payload: Serialize + DeserializeOwned + Clone + fmt::Debug {
    /// The role this payload belongs to.
    const ROLE: Role;

    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
    fn expires(&self) -> OffsetDateTime;
    fn set_expires(&mut self, expires: OffsetDateTime);

    /// Post-load fixup; the default does nothing.
    fn normalize(&mut self) {}
}

/// Key IDs and threshold governing one role, as recorded in root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u32,
}

/// The root payload. Self-delegating: records the key set and threshold of
/// every role, including root itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
#[serde(rename = "root")]
pub struct RootPayload {
    pub spec_version: String,
    pub consistent_snapshot: bool,
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
    pub keys: BTreeMap<String, Key>,
    pub roles: BTreeMap<String, RoleKeys>,
}

impl RootPayload {
    /// A fresh version-1 root with empty key sets and thresholds of 1.
    pub fn new(expires: OffsetDateTime) -> Self {
        let roles = Role::ALL
            .iter()
            .map(|role| {
                (
                    role.name().to_string(),
                    RoleKeys {
                        keyids: Vec::new(),
                        threshold: 1,
                    },
                )
            })
            .collect();
        RootPayload {
            spec_version: SPEC_VERSION.to_string(),
            consistent_snapshot: true,
            version: 1,
            expires,
            keys: BTreeMap::new(),
            roles,
        }
    }

    /// Key IDs and threshold for `role`.
    pub fn role_keys(&self, role: Role) -> Result<&RoleKeys> {
        self.roles
            .get(role.name())
            .ok_or_else(|| Error::Decode(format!("root document has no entry for role {role}")))
    }

    pub fn role_keys_mut(&mut self, role: Role) -> Result<&mut RoleKeys> {
        self.roles
            .get_mut(role.name())
            .ok_or_else(|| Error::Decode(format!("root document has no entry for role {role}")))
    }

    /// Registers `key` for `role` and returns its derived key ID. Adding a
    /// key that is already authorized for the role is a no-op; the key
    /// object itself is shared across roles.
    pub fn add_key(&mut self, key: Key, role: Role) -> Result<String> {
        let keyid = key.key_id()?;
        let entry = self.role_keys_mut(role)?;
        if !entry.keyids.contains(&keyid) {
            entry.keyids.push(keyid.clone());
        }
        self.keys.entry(keyid.clone()).or_insert(key);
        Ok(keyid)
    }

    /// Removes `keyid` from `role`'s key set. Fails when the key is not in
    /// the set. The key object is dropped once no role references it.
    pub fn revoke_key(&mut self, keyid: &str, role: Role) -> Result<()> {
        let entry = self.role_keys_mut(role)?;
        let Some(pos) = entry.keyids.iter().position(|k| k == keyid) else {
            return Err(Error::UnknownKey {
                role,
                keyid: keyid.to_string(),
            });
        };
        entry.keyids.remove(pos);
        let still_referenced = self
            .roles
            .values()
            .any(|rk| rk.keyids.iter().any(|k| k == keyid));
        if !still_referenced {
            self.keys.remove(keyid);
        }
        Ok(())
    }
}

impl Payload for RootPayload {
    const ROLE: Role = Role::Root;

    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
    fn expires(&self) -> OffsetDateTime {
        self.expires
    }
    fn set_expires(&mut self, expires: OffsetDateTime) {
        self.expires = expires;
    }
}

/// Descriptor for one target file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFile {
    pub length: u64,
    /// Algorithm name -> lower-case hex digest. At minimum `sha256`.
    pub hashes: BTreeMap<String, String>,
}

impl TargetFile {
    pub fn sha256(&self) -> Option<&str> {
        self.hashes.get("sha256").map(String::as_str)
    }
}

/// The targets payload: a map from repository-local path to descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
#[serde(rename = "targets")]
pub struct TargetsPayload {
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
    pub targets: BTreeMap<String, TargetFile>,
}

impl TargetsPayload {
    pub fn new(expires: OffsetDateTime) -> Self {
        TargetsPayload {
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            targets: BTreeMap::new(),
        }
    }
}

impl Payload for TargetsPayload {
    const ROLE: Role = Role::Targets;

    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
    fn expires(&self) -> OffsetDateTime {
        self.expires
    }
    fn set_expires(&mut self, expires: OffsetDateTime) {
        self.expires = expires;
    }

    /// Target paths are forward-slashed on the wire; repair any document
    /// written by a tool that leaked host separators before comparing
    /// hashes against a fresh scan.
    fn normalize(&mut self) {
        if self.targets.keys().any(|path| path.contains('\\')) {
            self.targets = std::mem::take(&mut self.targets)
                .into_iter()
                .map(|(path, file)| (path.replace('\\', "/"), file))
                .collect();
        }
    }
}

/// Version pin for a downstream role file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u64,
}

/// The snapshot payload: pins the authoritative version of the targets
/// document under the key `targets.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
#[serde(rename = "snapshot")]
pub struct SnapshotPayload {
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
    pub meta: BTreeMap<String, MetaFile>,
}

impl SnapshotPayload {
    pub fn new(expires: OffsetDateTime) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert("targets.json".to_string(), MetaFile { version: 1 });
        SnapshotPayload {
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            meta,
        }
    }

    pub fn targets_version(&self) -> Option<u64> {
        self.meta.get("targets.json").map(|m| m.version)
    }

    pub fn set_targets_version(&mut self, version: u64) {
        self.meta
            .insert("targets.json".to_string(), MetaFile { version });
    }
}

impl Payload for SnapshotPayload {
    const ROLE: Role = Role::Snapshot;

    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
    fn expires(&self) -> OffsetDateTime {
        self.expires
    }
    fn set_expires(&mut self, expires: OffsetDateTime) {
        self.expires = expires;
    }
}

/// The timestamp payload: pins the authoritative snapshot version under
/// the key `snapshot.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
#[serde(rename = "timestamp")]
pub struct TimestampPayload {
    pub spec_version: String,
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
    pub meta: BTreeMap<String, MetaFile>,
}

impl TimestampPayload {
    pub fn new(expires: OffsetDateTime) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert("snapshot.json".to_string(), MetaFile { version: 1 });
        TimestampPayload {
            spec_version: SPEC_VERSION.to_string(),
            version: 1,
            expires,
            meta,
        }
    }

    pub fn snapshot_version(&self) -> Option<u64> {
        self.meta.get("snapshot.json").map(|m| m.version)
    }

    pub fn set_snapshot_version(&mut self, version: u64) {
        self.meta
            .insert("snapshot.json".to_string(), MetaFile { version });
    }
}

impl Payload for TimestampPayload {
    const ROLE: Role = Role::Timestamp;

    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
    fn expires(&self) -> OffsetDateTime {
        self.expires
    }
    fn set_expires(&mut self, expires: OffsetDateTime) {
        self.expires = expires;
    }
}

/// `now + days`, truncated to whole seconds so the RFC 3339 form stays
/// readable.
pub fn expire_in(days: u16) -> OffsetDateTime {
    let when = OffsetDateTime::now_utc() + time::Duration::days(i64::from(days));
    when.replace_nanosecond(0).unwrap_or(when)
}
