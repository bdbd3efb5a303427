//! # tufsmith
//!
//! Authoring-side manager for threshold-signed update repository metadata.
//!
//! A repository is described by four hierarchical roles -- root, targets,
//! snapshot, timestamp -- each publishing a signed JSON document. Root
//! delegates trust: it records, for every role including itself, the set of
//! authorized public keys and the number of distinct signatures (the
//! threshold) a document needs before it is trusted. tufsmith creates that
//! document set, republishes it as target files change, evolves the key
//! sets and thresholds over time, and verifies that a metadata directory is
//! internally consistent.
//!
//! ## Security Properties
//!
//! - **`#![forbid(unsafe_code)]`**: no `unsafe` blocks anywhere.
//! - **Pure-Rust cryptography**: RSA via the `rsa` crate, SHA-256 via
//!   `sha2` (RustCrypto, no FFI). Private key PEM buffers are wrapped in
//!   `zeroize::Zeroizing`.
//! - **Defensive input handling**: metadata and key file reads are
//!   symlink-checked and size-bounded; the target scanner refuses
//!   symlinks and enforces per-file and total size limits.
//! - **Atomic persistence**: every metadata write goes to a temporary
//!   sibling first and is renamed into place; operations that write
//!   multiple files delete everything they created on the first failure.
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`errors`] | The crate-wide [`errors::Error`] enum |
//! | [`keys`] | RSA key generation, PEM parse/export, key IDs |
//! | [`scan`] | Repository walk producing target descriptors |
//! | [`meta`] | Role documents, signatures, codec, role set |
//! | [`verify`] | Quorum, expiry, cross-reference, continuity checks |
//! | [`ops`] | The seven operator-facing operations |
//! | [`prompt`] | Operator confirmation seam |

#![forbid(unsafe_code)]

pub mod errors;
pub mod keys;
pub mod meta;
pub mod ops;
pub mod prompt;
pub mod scan;
pub mod verify;

pub use errors::{Error, Result};
