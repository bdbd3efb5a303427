//! Serialization of role documents.
//!
//! Two byte forms exist for every document:
//!
//! - the **canonical form** (canonical JSON of the payload, sorted keys,
//!   no insignificant whitespace) -- the input to signing and signature
//!   verification. Two encodings of the same payload are byte-identical.
//! - the **file form** (pretty-printed JSON of the whole envelope) -- what
//!   lands on disk. Map keys are `BTreeMap`-ordered, so this is
//!   deterministic too, but signatures are never computed over it.
//!
//! Writes go to a temporary sibling file and are renamed into place, so a
//! crashed or failed write leaves no partial file behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{Error, Result};
use crate::meta::{Payload, Role, Signed};

/// Upper bound for a single metadata file. Far above any realistic
/// document, low enough to stop memory exhaustion from a bad file.
pub const MAX_METADATA_BYTES: u64 = 64 * 1024 * 1024;

/// File name for a role document: `<version>.<role>.json`, except
/// timestamp which is always `timestamp.json`.
pub fn metadata_filename(role: Role, version: u64) -> String {
    if role.versioned_filename() {
        format!("{version}.{}.json", role.name())
    } else {
        format!("{}.json", role.name())
    }
}

/// Canonical JSON bytes of `value`; the signature input.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut ser =
        serde_json::Serializer::with_formatter(&mut bytes, olpc_cjson::CanonicalFormatter::new());
    value
        .serialize(&mut ser)
        .map_err(|e| Error::Decode(format!("canonical serialization failed: {e}")))?;
    Ok(bytes)
}

/// Parses a value back out of its canonical byte form.
pub fn from_canonical_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| Error::Decode(format!("canonical deserialization failed: {e}")))
}

/// Reads a file after refusing symlinks and enforcing the size bound.
pub fn read_bounded(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let meta = fs::symlink_metadata(path).map_err(|e| Error::io(path, e))?;
    if meta.file_type().is_symlink() {
        return Err(Error::InvalidInput(format!(
            "refusing to read symlink: {}",
            path.display()
        )));
    }
    if meta.len() > max_bytes {
        return Err(Error::InvalidInput(format!(
            "file too large: {} ({} bytes, max {max_bytes})",
            path.display(),
            meta.len()
        )));
    }
    fs::read(path).map_err(|e| Error::io(path, e))
}

/// Loads a role document from `path`.
pub fn load<T: Payload>(path: &Path) -> Result<Signed<T>> {
    let bytes = read_bounded(path, MAX_METADATA_BYTES)?;
    let mut doc: Signed<T> = serde_json::from_slice(&bytes).map_err(|e| {
        Error::Decode(format!(
            "cannot parse {} metadata from {}: {e}",
            T::ROLE,
            path.display()
        ))
    })?;
    doc.signed.normalize();
    Ok(doc)
}

/// Writes a role document into `dir` under its canonical file name,
/// atomically. Returns the final path.
pub fn write_atomic<T: Payload>(dir: &Path, doc: &Signed<T>) -> Result<PathBuf> {
    let path = dir.join(metadata_filename(T::ROLE, doc.signed.version()));
    let mut bytes = serde_json::to_vec_pretty(doc)
        .map_err(|e| Error::Decode(format!("cannot serialize {} metadata: {e}", T::ROLE)))?;
    bytes.push(b'\n');

    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    fs::write(tmp.path(), &bytes).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(&path)
        .map_err(|e| Error::io(&path, e.error))?;
    Ok(path)
}
