//! End-to-end scenarios over the library API.
//!
//! Each test drives full operations (init, update, sign, threshold and
//! root-key changes, verify) against a temporary repository and metadata
//! directory. RSA keygen dominates the runtime, so one fixed set of test
//! keys is generated once per process and shared; key size is smaller than
//! the CLI's 4096 bits purely for speed -- no behavior depends on it.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rsa::RsaPrivateKey;
use tempfile::TempDir;

use tufsmith::keys;
use tufsmith::meta::{Role, RoleMap};
use tufsmith::ops::{
    self, ChangeRootKeyConfig, ChangeThresholdConfig, InitConfig, RootKeyAction, SignConfig,
    ThresholdAction, UpdateConfig,
};
use tufsmith::prompt::{Assent, Scripted};
use tufsmith::Error;

const ROLES: [&str; 4] = ["root", "targets", "snapshot", "timestamp"];

fn test_keys() -> &'static BTreeMap<String, RsaPrivateKey> {
    static KEYS: OnceLock<BTreeMap<String, RsaPrivateKey>> = OnceLock::new();
    KEYS.get_or_init(|| {
        let mut keys_by_name = BTreeMap::new();
        for role in ROLES {
            for i in 1..=2 {
                let (private, _) = keys::generate(2048).expect("keygen");
                keys_by_name.insert(format!("{role}{i}"), private);
            }
        }
        keys_by_name
    })
}

/// A repository plus metadata directory initialized with the shared keys,
/// every role at the same threshold.
struct Fixture {
    _tmp: TempDir,
    repo: PathBuf,
    meta: PathBuf,
    keydir: PathBuf,
}

impl Fixture {
    fn new(threshold: u32) -> Fixture {
        let tmp = TempDir::new().expect("tempdir");
        let repo = tmp.path().join("repo");
        fs::create_dir_all(repo.join("assets")).expect("mkdir repo");
        fs::write(repo.join("app.bin"), b"application-v1").expect("write target");
        fs::write(repo.join("assets").join("logo.png"), b"png-bytes").expect("write target");

        let keydir = tmp.path().join("keys");
        fs::create_dir_all(&keydir).expect("mkdir keys");
        for (name, private) in test_keys() {
            let pem = keys::export_private(private).expect("export private");
            fs::write(keydir.join(format!("{name}.pem")), pem.as_bytes()).expect("write key");
            let public = keys::export_public(&private.to_public_key()).expect("export public");
            fs::write(keydir.join(format!("{name}.pub")), public).expect("write pubkey");
        }

        let meta = tmp.path().join("metadata");
        let key_paths_for = |role: &str| -> Vec<PathBuf> {
            (1..=threshold as usize)
                .map(|i| keydir.join(format!("{role}{i}.pem")))
                .collect()
        };
        let cfg = InitConfig {
            repository_dir: repo.clone(),
            output_dir: meta.clone(),
            key_paths: RoleMap {
                root: key_paths_for("root"),
                targets: key_paths_for("targets"),
                snapshot: key_paths_for("snapshot"),
                timestamp: key_paths_for("timestamp"),
            },
            thresholds: RoleMap {
                root: threshold,
                targets: threshold,
                snapshot: threshold,
                timestamp: threshold,
            },
            expire_days: 365,
        };
        ops::init(&cfg).expect("init");

        Fixture {
            _tmp: tmp,
            repo,
            meta,
            keydir,
        }
    }

    fn key(&self, name: &str) -> PathBuf {
        self.keydir.join(format!("{name}.pem"))
    }

    fn pubkey(&self, name: &str) -> PathBuf {
        self.keydir.join(format!("{name}.pub"))
    }

    fn update_config(&self) -> UpdateConfig {
        UpdateConfig {
            repository_dir: self.repo.clone(),
            metadata_dir: self.meta.clone(),
            targets_key: Some(self.key("targets1")),
            snapshot_key: Some(self.key("snapshot1")),
            timestamp_key: Some(self.key("timestamp1")),
            expire_days: 365,
            ask_confirmation: false,
        }
    }

    fn sign_role(&self, role: Role, key_name: &str, forced: bool) {
        let cfg = SignConfig {
            metadata_dir: self.meta.clone(),
            role,
            key_path: self.key(key_name),
            forced,
        };
        ops::sign(&cfg, &mut Assent).expect("sign");
    }

    fn verify(&self) -> tufsmith::Result<tufsmith::verify::RepositoryReport> {
        ops::verify_repository(&self.repo, &self.meta)
    }
}

fn dir_snapshot(dir: &Path) -> BTreeMap<OsString, Vec<u8>> {
    fs::read_dir(dir)
        .expect("read_dir")
        .map(|entry| {
            let entry = entry.expect("entry");
            (entry.file_name(), fs::read(entry.path()).expect("read"))
        })
        .collect()
}

fn meta_json(dir: &Path, name: &str) -> serde_json::Value {
    serde_json::from_slice(&fs::read(dir.join(name)).expect("read metadata")).expect("parse json")
}

// -------------------------------------------------------------------------
// Scenario 1: happy init
// -------------------------------------------------------------------------

#[test]
fn happy_init_produces_verifiable_set() {
    let fx = Fixture::new(1);

    for name in [
        "1.root.json",
        "1.targets.json",
        "1.snapshot.json",
        "timestamp.json",
    ] {
        assert!(fx.meta.join(name).exists(), "{name} should exist");
    }

    let report = fx.verify().expect("verify");
    assert!(report.all_valid(), "all roles valid after init");
    assert!(report.changes.is_empty(), "no target drift right after init");

    let targets = meta_json(&fx.meta, "1.targets.json");
    assert_eq!(targets["signed"]["_type"], "targets");
    assert_eq!(targets["signed"]["version"], 1);
    assert!(targets["signed"]["targets"]["repo/app.bin"]["length"].is_u64());
    assert!(
        targets["signed"]["targets"]["repo/assets/logo.png"]["hashes"]["sha256"].is_string(),
        "forward-slashed path with sha256 hash"
    );
}

// -------------------------------------------------------------------------
// Scenario 2: dual-threshold init, single-key update, sign to completion
// -------------------------------------------------------------------------

#[test]
fn dual_threshold_update_needs_second_signatures() {
    let fx = Fixture::new(2);
    fs::write(fx.repo.join("app.bin"), b"application-v2-longer").expect("modify target");

    let changes = ops::update(&fx.update_config(), &mut Assent).expect("update");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path, "repo/app.bin");

    assert!(fx.meta.join("2.targets.json").exists());
    assert!(fx.meta.join("2.snapshot.json").exists());
    let timestamp = meta_json(&fx.meta, "timestamp.json");
    assert_eq!(timestamp["signed"]["version"], 2, "timestamp overwritten in place");
    assert_eq!(timestamp["signed"]["meta"]["snapshot.json"]["version"], 2);

    // One signature each against a threshold of two: root stays valid, the
    // three updated roles are reported short.
    let report = fx.verify().expect("verify runs");
    assert!(!report.all_valid());
    for row in &report.roles {
        match row.role {
            Role::Root => assert!(row.valid, "root untouched by update"),
            _ => {
                assert!(!row.valid, "{} should be short of quorum", row.role);
                assert!(matches!(
                    row.errors[0],
                    Error::InadequateSignatures { need: 2, have: 1, .. }
                ));
            }
        }
    }

    fx.sign_role(Role::Targets, "targets2", false);
    fx.sign_role(Role::Snapshot, "snapshot2", false);
    fx.sign_role(Role::Timestamp, "timestamp2", false);

    let report = fx.verify().expect("verify");
    assert!(report.all_valid(), "quorum completed by sign calls");
}

// -------------------------------------------------------------------------
// Scenario 3: root key rotation
// -------------------------------------------------------------------------

#[test]
fn root_key_rotation_with_forced_continuity_signature() {
    let fx = Fixture::new(2);

    // Re-adding a key root already lists is rejected.
    let err = ops::change_root_key(&ChangeRootKeyConfig {
        metadata_dir: fx.meta.clone(),
        action: RootKeyAction::Add,
        signing_key_path: fx.key("root1"),
        input_key_path: fx.key("root2"),
        expire_days: 365,
        threshold: 2,
    })
    .expect_err("duplicate add");
    assert!(matches!(err, Error::DuplicateKey { .. }));

    // Remove root2 and drop the threshold to one.
    ops::change_root_key(&ChangeRootKeyConfig {
        metadata_dir: fx.meta.clone(),
        action: RootKeyAction::Remove,
        signing_key_path: fx.key("root1"),
        input_key_path: fx.key("root2"),
        expire_days: 365,
        threshold: 1,
    })
    .expect("remove root2");
    assert!(fx.meta.join("2.root.json").exists());

    // The new root is signed only by root1, but the predecessor demanded
    // two signatures from its key set -- continuity is broken until the
    // removed key co-signs.
    let err = fx.verify().expect_err("continuity incomplete");
    assert!(matches!(err, Error::KeyContinuity { version: 2, .. }));

    // root2 is no longer listed by the new root, so only a forced sign can
    // record its endorsement.
    let unforced = ops::sign(
        &SignConfig {
            metadata_dir: fx.meta.clone(),
            role: Role::Root,
            key_path: fx.key("root2"),
            forced: false,
        },
        &mut Assent,
    )
    .expect_err("unforced sign with delisted key");
    assert!(matches!(unforced, Error::UnrecognizedKey { .. }));

    fx.sign_role(Role::Root, "root2", true);

    let report = fx.verify().expect("verify");
    assert!(report.all_valid(), "rotation complete");
}

// -------------------------------------------------------------------------
// Scenario 4: broken continuity
// -------------------------------------------------------------------------

#[test]
fn deleted_signature_breaks_continuity_at_named_version() {
    let fx = Fixture::new(2);

    // Rotate once so the chain has two root versions.
    ops::change_root_key(&ChangeRootKeyConfig {
        metadata_dir: fx.meta.clone(),
        action: RootKeyAction::Remove,
        signing_key_path: fx.key("root1"),
        input_key_path: fx.pubkey("root2"),
        expire_days: 365,
        threshold: 1,
    })
    .expect("remove root2");
    fx.sign_role(Role::Root, "root2", true);
    assert!(fx.verify().is_ok());

    // Drop one signature from the penultimate root; its own quorum of two
    // can no longer be met.
    let path = fx.meta.join("1.root.json");
    let mut doc = meta_json(&fx.meta, "1.root.json");
    let sigs = doc["signatures"].as_array_mut().expect("signatures");
    sigs.pop();
    fs::write(&path, serde_json::to_vec_pretty(&doc).expect("serialize")).expect("write");

    let err = fx.verify().expect_err("broken chain");
    assert!(
        matches!(err, Error::KeyContinuity { version: 1, .. }),
        "continuity error names the offending version, got: {err}"
    );
}

// -------------------------------------------------------------------------
// Scenario 5: cross-reference mismatch
// -------------------------------------------------------------------------

#[test]
fn edited_timestamp_reference_fails_cross_ref() {
    let fx = Fixture::new(1);

    let path = fx.meta.join("timestamp.json");
    let mut doc = meta_json(&fx.meta, "timestamp.json");
    doc["signed"]["meta"]["snapshot.json"]["version"] = serde_json::json!(9);
    fs::write(&path, serde_json::to_vec_pretty(&doc).expect("serialize")).expect("write");

    let err = fx.verify().expect_err("cross-ref mismatch");
    match err {
        Error::CrossRef { entry, want, got } => {
            assert_eq!(entry, "snapshot.json");
            assert_eq!(want, 1);
            assert_eq!(got, 9);
        }
        other => panic!("expected CrossRef, got: {other}"),
    }
}

// -------------------------------------------------------------------------
// Scenario 6: prompt decline leaves the directory untouched
// -------------------------------------------------------------------------

#[test]
fn declined_confirmation_changes_nothing() {
    let fx = Fixture::new(1);
    fs::write(fx.repo.join("new-file.bin"), b"fresh").expect("add target");

    let before = dir_snapshot(&fx.meta);

    let mut cfg = fx.update_config();
    cfg.ask_confirmation = true;
    let err = ops::update(&cfg, &mut Scripted(false)).expect_err("declined");
    assert!(matches!(err, Error::ConfirmationDeclined));

    assert_eq!(
        dir_snapshot(&fx.meta),
        before,
        "metadata directory must be byte-identical after a declined update"
    );
}

// -------------------------------------------------------------------------
// Update preconditions
// -------------------------------------------------------------------------

#[test]
fn update_rejects_unauthorized_key() {
    let fx = Fixture::new(1);

    let mut cfg = fx.update_config();
    cfg.targets_key = Some(fx.key("snapshot1"));
    let err = ops::update(&cfg, &mut Assent).expect_err("wrong key");
    assert!(matches!(
        err,
        Error::UnknownKey {
            role: Role::Targets,
            ..
        }
    ));
}

#[test]
fn update_requires_trusted_prior_metadata() {
    let fx = Fixture::new(1);

    // Strip the signatures from the published targets document.
    let path = fx.meta.join("1.targets.json");
    let mut doc = meta_json(&fx.meta, "1.targets.json");
    doc["signatures"] = serde_json::json!([]);
    fs::write(&path, serde_json::to_vec_pretty(&doc).expect("serialize")).expect("write");

    let before = dir_snapshot(&fx.meta);
    let err = ops::update(&fx.update_config(), &mut Assent).expect_err("untrusted prior");
    assert!(matches!(
        err,
        Error::InadequatePriorSignatures {
            role: Role::Targets,
            ..
        }
    ));
    assert_eq!(dir_snapshot(&fx.meta), before, "nothing written");
}

// -------------------------------------------------------------------------
// Sign preconditions
// -------------------------------------------------------------------------

#[test]
fn sign_rejects_duplicate_keyid() {
    let fx = Fixture::new(1);

    // targets1 already signed the document during init.
    let err = ops::sign(
        &SignConfig {
            metadata_dir: fx.meta.clone(),
            role: Role::Targets,
            key_path: fx.key("targets1"),
            forced: false,
        },
        &mut Assent,
    )
    .expect_err("duplicate");
    assert!(matches!(
        err,
        Error::DuplicateSignature {
            role: Role::Targets,
            ..
        }
    ));
}

#[test]
fn sign_rejects_unknown_key_unless_forced() {
    let fx = Fixture::new(1);

    let cfg = SignConfig {
        metadata_dir: fx.meta.clone(),
        role: Role::Targets,
        key_path: fx.key("snapshot2"),
        forced: false,
    };
    let err = ops::sign(&cfg, &mut Assent).expect_err("unrecognized");
    assert!(matches!(err, Error::UnrecognizedKey { .. }));

    // Forced bypasses only the key-listing precondition; the write happens
    // and verification keeps reporting the document as it is.
    let cfg = SignConfig {
        forced: true,
        ..cfg
    };
    ops::sign(&cfg, &mut Assent).expect("forced sign proceeds");
    let report = fx.verify().expect("verify");
    assert!(report.all_valid(), "extra unknown signature is ignored");
}

#[test]
fn sign_never_bumps_version() {
    let fx = Fixture::new(1);
    fx.sign_role(Role::Targets, "targets2", true);

    assert!(fx.meta.join("1.targets.json").exists());
    assert!(!fx.meta.join("2.targets.json").exists());
    let doc = meta_json(&fx.meta, "1.targets.json");
    assert_eq!(doc["signed"]["version"], 1);
    assert_eq!(doc["signatures"].as_array().expect("sigs").len(), 2);
}

// -------------------------------------------------------------------------
// Threshold changes
// -------------------------------------------------------------------------

#[test]
fn raise_targets_threshold_then_complete_quorum() {
    let fx = Fixture::new(1);

    ops::change_threshold(&ChangeThresholdConfig {
        metadata_dir: fx.meta.clone(),
        action: ThresholdAction::Add,
        role: Role::Targets,
        root_key_path: fx.key("root1"),
        role_key_path: fx.key("targets2"),
    })
    .expect("raise threshold");

    let root = meta_json(&fx.meta, "2.root.json");
    assert_eq!(root["signed"]["version"], 2);
    assert_eq!(root["signed"]["roles"]["targets"]["threshold"], 2);
    assert_eq!(
        root["signed"]["roles"]["targets"]["keyids"]
            .as_array()
            .expect("keyids")
            .len(),
        2
    );

    // The published targets document now falls one signature short.
    let report = fx.verify().expect("verify");
    let targets_row = report
        .roles
        .iter()
        .find(|r| r.role == Role::Targets)
        .expect("targets row");
    assert!(!targets_row.valid);

    fx.sign_role(Role::Targets, "targets2", false);
    assert!(fx.verify().expect("verify").all_valid());
}

#[test]
fn reduce_threshold_to_zero_rejected() {
    let fx = Fixture::new(1);

    let before = dir_snapshot(&fx.meta);
    let err = ops::change_threshold(&ChangeThresholdConfig {
        metadata_dir: fx.meta.clone(),
        action: ThresholdAction::Reduce,
        role: Role::Snapshot,
        root_key_path: fx.key("root1"),
        role_key_path: fx.pubkey("snapshot1"),
    })
    .expect_err("underflow");
    assert!(matches!(
        err,
        Error::ThresholdUnderflow {
            role: Role::Snapshot
        }
    ));
    assert_eq!(dir_snapshot(&fx.meta), before);
}

#[test]
fn add_existing_role_key_rejected() {
    let fx = Fixture::new(1);

    let err = ops::change_threshold(&ChangeThresholdConfig {
        metadata_dir: fx.meta.clone(),
        action: ThresholdAction::Add,
        role: Role::Targets,
        root_key_path: fx.key("root1"),
        role_key_path: fx.key("targets1"),
    })
    .expect_err("already present");
    assert!(matches!(err, Error::DuplicateKey { .. }));
}

#[test]
fn reduce_accepts_public_key_and_revokes() {
    let fx = Fixture::new(2);

    ops::change_threshold(&ChangeThresholdConfig {
        metadata_dir: fx.meta.clone(),
        action: ThresholdAction::Reduce,
        role: Role::Timestamp,
        root_key_path: fx.key("root1"),
        role_key_path: fx.pubkey("timestamp2"),
    })
    .expect("reduce with public key");

    let root = meta_json(&fx.meta, "2.root.json");
    assert_eq!(root["signed"]["roles"]["timestamp"]["threshold"], 1);
    assert_eq!(
        root["signed"]["roles"]["timestamp"]["keyids"]
            .as_array()
            .expect("keyids")
            .len(),
        1
    );
}

// -------------------------------------------------------------------------
// Root key management
// -------------------------------------------------------------------------

#[test]
fn removing_sole_root_key_rejected() {
    let fx = Fixture::new(1);

    let err = ops::change_root_key(&ChangeRootKeyConfig {
        metadata_dir: fx.meta.clone(),
        action: RootKeyAction::Remove,
        signing_key_path: fx.key("root1"),
        input_key_path: fx.key("root1"),
        expire_days: 365,
        threshold: 1,
    })
    .expect_err("sole key");
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn threshold_above_key_count_rejected() {
    let fx = Fixture::new(1);

    let err = ops::change_root_key(&ChangeRootKeyConfig {
        metadata_dir: fx.meta.clone(),
        action: RootKeyAction::Add,
        signing_key_path: fx.key("root1"),
        input_key_path: fx.key("root2"),
        expire_days: 365,
        threshold: 5,
    })
    .expect_err("unreachable threshold");
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn add_root_key_co_signs_for_immediate_continuity() {
    let fx = Fixture::new(1);

    ops::change_root_key(&ChangeRootKeyConfig {
        metadata_dir: fx.meta.clone(),
        action: RootKeyAction::Add,
        signing_key_path: fx.key("root1"),
        input_key_path: fx.key("root2"),
        expire_days: 365,
        threshold: 2,
    })
    .expect("add root2");

    let root = meta_json(&fx.meta, "2.root.json");
    assert_eq!(
        root["signatures"].as_array().expect("sigs").len(),
        2,
        "signing key plus the added key"
    );
    assert!(fx.verify().expect("verify").all_valid());
}

// -------------------------------------------------------------------------
// Update cross-reference invariant
// -------------------------------------------------------------------------

#[test]
fn update_pins_fresh_versions() {
    let fx = Fixture::new(1);
    fs::write(fx.repo.join("app.bin"), b"application-v2").expect("modify");
    ops::update(&fx.update_config(), &mut Assent).expect("update once");
    fs::write(fx.repo.join("app.bin"), b"application-v3!").expect("modify again");
    ops::update(&fx.update_config(), &mut Assent).expect("update twice");

    let snapshot = meta_json(&fx.meta, "3.snapshot.json");
    assert_eq!(snapshot["signed"]["meta"]["targets.json"]["version"], 3);
    let timestamp = meta_json(&fx.meta, "timestamp.json");
    assert_eq!(timestamp["signed"]["meta"]["snapshot.json"]["version"], 3);

    assert!(fx.verify().expect("verify").all_valid());
}
