//! Error types for tufsmith.
//!
//! Every fallible operation in the crate returns [`Error`]. The variants
//! are deliberately specific: an operator reading a failure banner needs to
//! know whether the problem is a missing file, a malformed key, a quorum
//! shortage, or a broken root chain, because each calls for a different
//! remedy. Error messages never include key material.

use std::fmt;
use std::io;
use std::path::PathBuf;

use time::OffsetDateTime;

use crate::meta::Role;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by tufsmith operations.
#[derive(Debug)]
pub enum Error {
    /// Filesystem access failed.
    Io {
        /// Path involved in the failed access.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// PEM, JSON, or key material could not be parsed.
    Decode(String),

    /// Pre-flight validation rejected the operation's inputs. Nothing was
    /// written to disk.
    InvalidInput(String),

    /// A supplied key's derived key ID is not in the authoritative root's
    /// key set for the role it was supplied for.
    UnknownKey {
        /// Role the key was supplied for.
        role: Role,
        /// Derived key ID of the supplied key.
        keyid: String,
    },

    /// The key used to sign is not authorized by the (new) root document.
    UnrecognizedKey {
        /// Role whose document was being signed.
        role: Role,
        /// Derived key ID of the signing key.
        keyid: String,
    },

    /// A key being added is already present in the role's key set.
    DuplicateKey {
        /// Derived key ID of the rejected key.
        keyid: String,
    },

    /// A signature list would contain two entries under the same key ID.
    DuplicateSignature {
        /// Role whose signature list is affected.
        role: Role,
        /// Key ID appearing more than once.
        keyid: String,
    },

    /// Reducing a threshold would take it to zero.
    ThresholdUnderflow {
        /// Role whose threshold was being reduced.
        role: Role,
    },

    /// Previously published metadata does not meet its quorum. Operations
    /// that evolve the repository require a trusted starting point, so this
    /// is fatal.
    InadequatePriorSignatures {
        /// Role whose prior document fell short.
        role: Role,
        /// Human-readable quorum detail.
        detail: String,
    },

    /// A document does not carry enough valid signatures to meet its
    /// threshold. For freshly produced metadata this is warning-class and
    /// may be resolved by operator confirmation plus later `sign` calls.
    InadequateSignatures {
        /// Role whose document fell short.
        role: Role,
        /// Count of unique valid signatures from authorized keys.
        have: usize,
        /// Threshold required by the authoritative root.
        need: u32,
    },

    /// Timestamp/snapshot version references do not line up.
    CrossRef {
        /// Meta entry that is wrong (e.g. `snapshot.json`).
        entry: String,
        /// Version the referenced document actually carries.
        want: u64,
        /// Version recorded in the referencing document.
        got: u64,
    },

    /// A hop in the root version chain is not endorsed to threshold.
    KeyContinuity {
        /// Root version that lacks the required endorsement.
        version: u64,
        /// Human-readable detail of the failed hop.
        detail: String,
    },

    /// A role document's expiry is not in the future.
    Expired {
        /// Role whose document expired.
        role: Role,
        /// The recorded expiry.
        expires: OffsetDateTime,
    },

    /// The operator declined an interactive confirmation.
    ConfirmationDeclined,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "I/O error on {}: {source}", path.display())
            }
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::UnknownKey { role, keyid } => {
                write!(f, "key {keyid} is not authorized for role {role}")
            }
            Self::UnrecognizedKey { role, keyid } => {
                write!(f, "unrecognized key {keyid} used to sign role {role}")
            }
            Self::DuplicateKey { keyid } => {
                write!(f, "key {keyid} is already present in the role's key set")
            }
            Self::DuplicateSignature { role, keyid } => {
                write!(
                    f,
                    "duplicate signature under key {keyid} for role {role}"
                )
            }
            Self::ThresholdUnderflow { role } => {
                write!(f, "threshold for role {role} cannot be lower than 1")
            }
            Self::InadequatePriorSignatures { role, detail } => {
                write!(
                    f,
                    "previously published {role} metadata has inadequate signatures: {detail}"
                )
            }
            Self::InadequateSignatures { role, have, need } => {
                write!(
                    f,
                    "{role} metadata carries {have} valid signature(s), threshold is {need}"
                )
            }
            Self::CrossRef { entry, want, got } => {
                write!(
                    f,
                    "cross-reference mismatch for {entry}: recorded version {got}, actual version {want}"
                )
            }
            Self::KeyContinuity { version, detail } => {
                write!(f, "root key continuity broken at version {version}: {detail}")
            }
            Self::Expired { role, expires } => {
                write!(f, "{role} metadata expired (valid until {expires})")
            }
            Self::ConfirmationDeclined => write!(f, "operation declined by operator"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
