//! tufsmith CLI binary.
//!
//! Seven verbs over a threshold-signed metadata repository:
//!
//! 1. `keygen`           -- generate a 4096-bit RSA keypair as PEM files.
//! 2. `init`             -- create the version-1 metadata set for a
//!    target directory.
//! 3. `update`           -- republish targets/snapshot/timestamp after
//!    target files changed.
//! 4. `sign`             -- add one signature to an existing document.
//! 5. `change-threshold` -- change a non-root role's threshold.
//! 6. `change-root-key`  -- add/remove a root key and re-issue root.
//! 7. `verify`           -- check the repository and print a report.
//!
//! Every verb prints a fixed success/failure banner as the last line of
//! stdout and exits non-zero on failure.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use tufsmith::meta::{Role, RoleMap};
use tufsmith::ops::{
    self, ChangeRootKeyConfig, ChangeThresholdConfig, InitConfig, KeygenConfig, RootKeyAction,
    SignConfig, ThresholdAction, UpdateConfig,
};
use tufsmith::prompt::{Assent, Confirmer, StdinConfirmer};
use tufsmith::Error;

const KEYGEN_SUCCEEDED: &str = "----------KEYGEN SUCCEEDED----------";
const KEYGEN_FAILED: &str = "----------KEYGEN FAILED----------";
const INIT_SUCCEEDED: &str = "----------INIT SUCCEEDED----------";
const INIT_FAILED: &str = "----------INIT FAILED----------";
const UPDATE_SUCCEEDED: &str = "----------UPDATE SUCCEEDED----------";
const UPDATE_FAILED: &str = "----------UPDATE FAILED----------";
const SIGN_SUCCEEDED: &str = "----------SIGN SUCCEEDED----------";
const SIGN_FAILED: &str = "----------SIGN FAILED----------";
const CHANGE_THRESHOLD_SUCCEEDED: &str = "----------CHANGE THRESHOLD SUCCEEDED----------";
const CHANGE_THRESHOLD_FAILED: &str = "----------CHANGE THRESHOLD FAILED----------";
const CHANGE_ROOT_KEY_SUCCEEDED: &str = "----------CHANGE ROOT KEY SUCCEEDED----------";
const CHANGE_ROOT_KEY_FAILED: &str = "----------CHANGE ROOT KEY FAILED----------";
const VERIFY_SUCCEEDED: &str = "----------VERIFY SUCCEEDED----------";
const VERIFY_FAILED: &str = "----------VERIFY FAILED----------";

#[derive(Parser)]
#[command(name = "tufsmith", about = "Threshold-signed update repository manager", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
    Root,
    Targets,
    Snapshot,
    Timestamp,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Role {
        match arg {
            RoleArg::Root => Role::Root,
            RoleArg::Targets => Role::Targets,
            RoleArg::Snapshot => Role::Snapshot,
            RoleArg::Timestamp => Role::Timestamp,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ThresholdActionArg {
    Add,
    Reduce,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RootKeyActionArg {
    Add,
    Remove,
}

#[derive(Subcommand)]
enum Cmd {
    /// Generate RSA keypair pem files (4096 bit)
    Keygen {
        /// Directory for output key files
        #[arg(long)]
        output_dir: PathBuf,
        /// Private key filename
        #[arg(long)]
        priv_filename: String,
        /// Public key filename
        #[arg(long)]
        pub_filename: String,
    },

    /// Initialize repository with metadata files
    Init {
        /// Directory containing target files
        #[arg(long)]
        repository_dir: PathBuf,
        /// Directory for output metadata files
        #[arg(long)]
        output_dir: PathBuf,
        /// Root private key filepath(s), `;`-delimited
        #[arg(long)]
        root_priv_filepath: String,
        /// Targets private key filepath(s), `;`-delimited
        #[arg(long)]
        targets_priv_filepath: String,
        /// Snapshot private key filepath(s), `;`-delimited
        #[arg(long)]
        snapshot_priv_filepath: String,
        /// Timestamp private key filepath(s), `;`-delimited
        #[arg(long)]
        timestamp_priv_filepath: String,
        /// Root key threshold
        #[arg(long, default_value_t = 1)]
        root_threshold: u32,
        /// Targets key threshold
        #[arg(long, default_value_t = 1)]
        targets_threshold: u32,
        /// Snapshot key threshold
        #[arg(long, default_value_t = 1)]
        snapshot_threshold: u32,
        /// Timestamp key threshold
        #[arg(long, default_value_t = 1)]
        timestamp_threshold: u32,
        /// Metadata file expiration in days
        #[arg(long, default_value_t = 365)]
        expire: u16,
    },

    /// Update repository with new metadata files
    Update {
        /// Directory containing target files
        #[arg(long)]
        repository_dir: PathBuf,
        /// Directory containing metadata files
        #[arg(long)]
        metadata_dir: PathBuf,
        /// Private key for the targets role
        #[arg(long)]
        targets_priv_filepath: PathBuf,
        /// Private key for the snapshot role (requires targets key)
        #[arg(long)]
        snapshot_priv_filepath: Option<PathBuf>,
        /// Private key for the timestamp role (requires snapshot and
        /// targets keys)
        #[arg(long)]
        timestamp_priv_filepath: Option<PathBuf>,
        /// Metadata file expiration in days
        #[arg(long, default_value_t = 365)]
        expire: u16,
        /// Ask for confirmation before proceeding
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        ask_confirmation: bool,
    },

    /// Sign the metadata file of a role
    Sign {
        /// Directory containing metadata files
        #[arg(long)]
        metadata_dir: PathBuf,
        /// Signing role
        #[arg(long, value_enum)]
        role: RoleArg,
        /// Private key filepath for the role
        #[arg(long)]
        priv_filepath: PathBuf,
        /// Force signing with a key root does not list for the role
        #[arg(long)]
        forced: bool,
    },

    /// Change signature threshold of a role, except root
    ChangeThreshold {
        /// Directory containing metadata files
        #[arg(long)]
        metadata_dir: PathBuf,
        /// Threshold action
        #[arg(long, value_enum)]
        action: ThresholdActionArg,
        /// Role to change: targets/snapshot/timestamp
        #[arg(long, value_enum)]
        role: RoleArg,
        /// Root private key filepath
        #[arg(long)]
        root_priv_filepath: PathBuf,
        /// Role key to be added (private) / removed (private or public)
        #[arg(long)]
        role_priv_filepath: PathBuf,
    },

    /// Change root key
    ChangeRootKey {
        /// Directory containing metadata files
        #[arg(long)]
        metadata_dir: PathBuf,
        /// Action
        #[arg(long, value_enum)]
        action: RootKeyActionArg,
        /// Root private key used for signing
        #[arg(long)]
        priv_filepath: PathBuf,
        /// Root key to be added (private) / removed (private or public)
        #[arg(long)]
        input_priv_filepath: PathBuf,
        /// Metadata file expiration in days
        #[arg(long, default_value_t = 365)]
        expire: u16,
        /// Root key threshold
        #[arg(long, default_value_t = 1)]
        threshold: u32,
    },

    /// Verify repository metadata files and targets
    Verify {
        /// Directory containing target files
        #[arg(long)]
        repository_dir: PathBuf,
        /// Directory containing metadata files
        #[arg(long)]
        metadata_dir: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    std::process::exit(run(cli.cmd));
}

fn split_key_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(';').map(PathBuf::from).collect()
}

/// Runs one verb, printing its banner; returns the process exit code.
fn run(cmd: Cmd) -> i32 {
    match cmd {
        Cmd::Keygen {
            output_dir,
            priv_filename,
            pub_filename,
        } => {
            println!("Running keygen command...");
            let cfg = KeygenConfig {
                output_dir,
                private_filename: priv_filename,
                public_filename: pub_filename,
            };
            banner(ops::keygen(&cfg).map(|()| None), KEYGEN_SUCCEEDED, KEYGEN_FAILED)
        }

        Cmd::Init {
            repository_dir,
            output_dir,
            root_priv_filepath,
            targets_priv_filepath,
            snapshot_priv_filepath,
            timestamp_priv_filepath,
            root_threshold,
            targets_threshold,
            snapshot_threshold,
            timestamp_threshold,
            expire,
        } => {
            println!("Running init command...");
            let cfg = InitConfig {
                repository_dir,
                output_dir: output_dir.clone(),
                key_paths: RoleMap {
                    root: split_key_paths(&root_priv_filepath),
                    targets: split_key_paths(&targets_priv_filepath),
                    snapshot: split_key_paths(&snapshot_priv_filepath),
                    timestamp: split_key_paths(&timestamp_priv_filepath),
                },
                thresholds: RoleMap {
                    root: root_threshold,
                    targets: targets_threshold,
                    snapshot: snapshot_threshold,
                    timestamp: timestamp_threshold,
                },
                expire_days: expire,
            };
            let outcome = ops::init(&cfg)
                .map(|()| Some(format!("Metadata files written to: {}", output_dir.display())));
            banner(outcome, INIT_SUCCEEDED, INIT_FAILED)
        }

        Cmd::Update {
            repository_dir,
            metadata_dir,
            targets_priv_filepath,
            snapshot_priv_filepath,
            timestamp_priv_filepath,
            expire,
            ask_confirmation,
        } => {
            println!("Running update command...");
            let cfg = UpdateConfig {
                repository_dir,
                metadata_dir: metadata_dir.clone(),
                targets_key: Some(targets_priv_filepath),
                snapshot_key: snapshot_priv_filepath,
                timestamp_key: timestamp_priv_filepath,
                expire_days: expire,
                ask_confirmation,
            };
            let mut confirmer: Box<dyn Confirmer> = if ask_confirmation {
                Box::new(StdinConfirmer::new())
            } else {
                Box::new(Assent)
            };
            let outcome = ops::update(&cfg, confirmer.as_mut()).map(|_| {
                Some(format!(
                    "Metadata files updated in dir: {}",
                    metadata_dir.display()
                ))
            });
            banner(outcome, UPDATE_SUCCEEDED, UPDATE_FAILED)
        }

        Cmd::Sign {
            metadata_dir,
            role,
            priv_filepath,
            forced,
        } => {
            println!("Running sign command...");
            let role = Role::from(role);
            println!("Signing metadata file as role: {role}...");
            let cfg = SignConfig {
                metadata_dir: metadata_dir.clone(),
                role,
                key_path: priv_filepath,
                forced,
            };
            let outcome = ops::sign(&cfg, &mut StdinConfirmer::new()).map(|_| {
                Some(format!(
                    "Metadata file for role {role} updated in dir: {}",
                    metadata_dir.display()
                ))
            });
            banner(outcome, SIGN_SUCCEEDED, SIGN_FAILED)
        }

        Cmd::ChangeThreshold {
            metadata_dir,
            action,
            role,
            root_priv_filepath,
            role_priv_filepath,
        } => {
            println!("Running change-threshold command...");
            let cfg = ChangeThresholdConfig {
                metadata_dir,
                action: match action {
                    ThresholdActionArg::Add => ThresholdAction::Add,
                    ThresholdActionArg::Reduce => ThresholdAction::Reduce,
                },
                role: Role::from(role),
                root_key_path: root_priv_filepath,
                role_key_path: role_priv_filepath,
            };
            println!("Changing signature threshold of role: {}...", cfg.role);
            banner(
                ops::change_threshold(&cfg).map(|_| None),
                CHANGE_THRESHOLD_SUCCEEDED,
                CHANGE_THRESHOLD_FAILED,
            )
        }

        Cmd::ChangeRootKey {
            metadata_dir,
            action,
            priv_filepath,
            input_priv_filepath,
            expire,
            threshold,
        } => {
            println!("Running change-root-key command...");
            let cfg = ChangeRootKeyConfig {
                metadata_dir,
                action: match action {
                    RootKeyActionArg::Add => RootKeyAction::Add,
                    RootKeyActionArg::Remove => RootKeyAction::Remove,
                },
                signing_key_path: priv_filepath,
                input_key_path: input_priv_filepath,
                expire_days: expire,
                threshold,
            };
            banner(
                ops::change_root_key(&cfg).map(|_| None),
                CHANGE_ROOT_KEY_SUCCEEDED,
                CHANGE_ROOT_KEY_FAILED,
            )
        }

        Cmd::Verify {
            repository_dir,
            metadata_dir,
        } => {
            println!("Running verify command...");
            let outcome = match ops::verify_repository(&repository_dir, &metadata_dir) {
                Ok(report) if report.all_valid() => Ok(None),
                Ok(report) => Err(report
                    .into_first_error()
                    .unwrap_or(Error::InvalidInput("verification failed".to_string()))),
                Err(e) => Err(e),
            };
            banner(outcome, VERIFY_SUCCEEDED, VERIFY_FAILED)
        }
    }
}

/// Prints the outcome's message and the verb banner; maps to the exit
/// code.
fn banner(outcome: Result<Option<String>, Error>, succeeded: &str, failed: &str) -> i32 {
    match outcome {
        Ok(message) => {
            if let Some(message) = message {
                println!("{message}");
            }
            println!("{succeeded}");
            0
        }
        Err(e) => {
            println!("Encountered some issue: {e}");
            println!("{failed}");
            1
        }
    }
}
