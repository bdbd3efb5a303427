//! Repository directory scanner.
//!
//! Walks the repository root depth-first and produces one descriptor per
//! regular file: the repository-local path (trailing directory name of the
//! root joined with the relative path, forward slashes regardless of
//! host), the byte length, and the SHA-256 digest. The listing is sorted
//! by local path so two scans of identical trees are identical.
//!
//! Conservative limits apply. If a repository legitimately outgrows them,
//! bump the constants in a controlled release and document it.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::errors::{Error, Result};
use crate::meta::{expire_in, TargetFile, TargetsPayload};

const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024; // 100 MiB
const MAX_TARGET_FILES: usize = 10_000;
const MAX_TOTAL_SIZE: u64 = 2 * 1024 * 1024 * 1024; // 2 GiB

/// One scanned target file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannedTarget {
    /// Repository-local path, e.g. `repo/sub/file.bin`.
    pub local_path: String,
    /// Absolute path on the host filesystem.
    pub abs_path: PathBuf,
    /// Length and hashes, as recorded in the targets document.
    pub descriptor: TargetFile,
}

fn sha256_file_streaming(path: &Path) -> Result<(String, u64)> {
    let meta = fs::symlink_metadata(path).map_err(|e| Error::io(path, e))?;
    if meta.file_type().is_symlink() {
        return Err(Error::InvalidInput(format!(
            "refusing to hash symlink: {}",
            path.display()
        )));
    }
    let len = meta.len();

    let mut file = fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok((hex::encode(hasher.finalize()), len))
}

/// The local-path prefix: the trailing directory name of the scan root.
fn local_root_name(dir: &Path) -> Result<String> {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "repository path has no trailing directory name: {}",
                dir.display()
            ))
        })
}

/// Scans `dir` and returns descriptors sorted by local path.
pub fn scan(dir: &Path) -> Result<Vec<ScannedTarget>> {
    let root_name = local_root_name(dir)?;
    let mut targets = Vec::new();
    let mut total_size: u64 = 0;

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            match e.into_io_error() {
                Some(io) => Error::io(path, io),
                None => Error::InvalidInput(format!("walk error under {}", path.display())),
            }
        })?;

        if entry.path_is_symlink() {
            return Err(Error::InvalidInput(format!(
                "refusing to include symlink in repository: {}",
                entry.path().display()
            )));
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if targets.len() >= MAX_TARGET_FILES {
            return Err(Error::InvalidInput(format!(
                "too many target files (max {MAX_TARGET_FILES})"
            )));
        }

        let file_meta = entry.metadata().map_err(|e| {
            Error::InvalidInput(format!("cannot stat {}: {e}", entry.path().display()))
        })?;
        if file_meta.len() > MAX_FILE_SIZE {
            return Err(Error::InvalidInput(format!(
                "target file too large: {} ({} bytes, max {MAX_FILE_SIZE})",
                entry.path().display(),
                file_meta.len()
            )));
        }
        total_size = total_size.saturating_add(file_meta.len());
        if total_size > MAX_TOTAL_SIZE {
            return Err(Error::InvalidInput(format!(
                "repository too large: {total_size} bytes (max {MAX_TOTAL_SIZE})"
            )));
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|_| {
                Error::InvalidInput(format!(
                    "walked path {} escapes {}",
                    entry.path().display(),
                    dir.display()
                ))
            })?;
        let mut local_path = root_name.clone();
        for component in relative.components() {
            local_path.push('/');
            local_path.push_str(&component.as_os_str().to_string_lossy());
        }

        let (sha256, length) = sha256_file_streaming(entry.path())?;
        log::debug!("scanned target {local_path} ({length} bytes)");

        let mut hashes = BTreeMap::new();
        hashes.insert("sha256".to_string(), sha256);
        targets.push(ScannedTarget {
            local_path,
            abs_path: entry.path().to_path_buf(),
            descriptor: TargetFile { length, hashes },
        });
    }

    targets.sort_by(|a, b| a.local_path.cmp(&b.local_path));
    Ok(targets)
}

/// Scans `dir` into a fresh version-1 targets payload expiring in
/// `expire_days`.
pub fn build_targets_payload(dir: &Path, expire_days: u16) -> Result<TargetsPayload> {
    let mut payload = TargetsPayload::new(expire_in(expire_days));
    for target in scan(dir)? {
        payload.targets.insert(target.local_path, target.descriptor);
    }
    Ok(payload)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_produces_prefixed_sorted_paths() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(repo.join("sub")).unwrap();
        fs::write(repo.join("b.bin"), b"bbbb").unwrap();
        fs::write(repo.join("sub").join("a.bin"), b"aa").unwrap();

        let scanned = scan(&repo).unwrap();
        let paths: Vec<_> = scanned.iter().map(|t| t.local_path.as_str()).collect();
        assert_eq!(paths, vec!["repo/b.bin", "repo/sub/a.bin"]);
        assert!(paths.iter().all(|p| !p.contains('\\')));
        assert_eq!(scanned[0].descriptor.length, 4);
        assert_eq!(scanned[1].descriptor.length, 2);
    }

    #[test]
    fn scan_hashes_content() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("hello.txt"), b"hello").unwrap();

        let scanned = scan(&repo).unwrap();
        assert_eq!(
            scanned[0].descriptor.sha256().unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn scan_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("x"), b"1").unwrap();
        fs::write(repo.join("y"), b"2").unwrap();

        assert_eq!(scan(&repo).unwrap(), scan(&repo).unwrap());
    }

    #[test]
    fn empty_repository_is_fine() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        assert!(scan(&repo).unwrap().is_empty());
    }

    #[test]
    fn missing_root_is_io_error() {
        let err = scan(Path::new("/nonexistent/repo")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_in_repository_rejected() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("real"), b"data").unwrap();
        std::os::unix::fs::symlink(repo.join("real"), repo.join("link")).unwrap();

        let err = scan(&repo).unwrap_err();
        assert!(err.to_string().contains("symlink"));
    }

    #[test]
    fn build_targets_payload_fills_map() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("f.bin"), b"abc").unwrap();

        let payload = build_targets_payload(&repo, 30).unwrap();
        assert_eq!(payload.version, 1);
        assert_eq!(payload.targets.len(), 1);
        assert_eq!(payload.targets["repo/f.bin"].length, 3);
    }
}
