//! Repository verification.
//!
//! Composes the four verifier checks over the latest metadata set, prints
//! the operator-facing report, and surfaces the first structural failure.

use std::path::Path;

use crate::errors::Result;
use crate::meta::role_set::RoleSet;
use crate::verify::{self, RepositoryReport};

/// Verifies the repository and returns the per-role report plus target
/// diff.
///
/// Per-role quorum and expiry failures are recorded in the report
/// (`valid = false`) and returned as `Ok`; the caller decides whether
/// that constitutes failure. Structural problems -- unloadable metadata,
/// cross-reference mismatches, broken root continuity -- are errors.
pub fn verify_repository(repo_dir: &Path, metadata_dir: &Path) -> Result<RepositoryReport> {
    let set = RoleSet::load(metadata_dir)?;
    let report = verify::report(&set, repo_dir)?;

    print!("{}", verify::render_changes(&report.changes));
    print!("{}", render_roles(&report));

    verify::check_cross_references(&set)?;

    log::info!("beginning root key continuity walk over {} root file(s)", set.root_paths().len());
    verify::check_root_continuity(set.root_paths())?;

    Ok(report)
}

fn render_roles(report: &RepositoryReport) -> String {
    let mut out = String::from(
        "    No.  Role       Filepath                        Threshold  Expiration            Valid  Error(s)\n",
    );
    for (i, row) in report.roles.iter().enumerate() {
        let errors = row
            .errors
            .iter()
            .enumerate()
            .map(|(j, e)| format!("{}. {e}", j + 1))
            .collect::<Vec<_>>()
            .join("; ");
        out.push_str(&format!(
            "    {}.  {:<9}  {:<30}  {:<9}  {:<20}  {:<5}  {errors}\n",
            i + 1,
            row.role.to_string(),
            row.path.display().to_string(),
            row.threshold,
            row.expires.to_string(),
            row.valid
        ));
    }
    out
}
