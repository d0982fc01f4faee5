//! Resolve CODEOWNERS ownership for a set of changed files and work out the
//! smallest set of approvals the change needs.
//!
//! The pipeline is: parse the rule file ([`parser`]), resolve each file to
//! the owners of its last matching rule ([`RuleSet`]), bucket files with
//! identical owner sets into approval groups ([`grouping`]), fetch the
//! rosters of owning teams ([`teams`]) and check which groups the current
//! approvals satisfy ([`satisfaction`]). [`Engine`] runs all of it.

mod engine;
mod error;
pub mod grouping;
pub mod parser;
mod pattern;
mod ruleset;
pub mod satisfaction;
pub mod teams;

use std::path::Path;

pub use engine::{resolve_ownership, Engine, PullRequestSnapshot};
pub use error::{Error, Result, RosterError};
pub use grouping::{group_by_ownership, ApprovalGroup, Grouping};
pub use pattern::Pattern;
pub use ruleset::{Owner, OwnerKind, ResolvedFileOwnership, Rule, RuleSet};
pub use satisfaction::{compute_satisfaction, Report, Satisfaction};
pub use teams::{
    resolve_teams, CancellationToken, ResolveOptions, RosterProvider, TeamRoster, TeamRosters,
};

/// Load and compile a rule file from disk.
pub fn from_path(path: impl AsRef<Path>) -> Result<RuleSet> {
    let parsed = parser::parse_file(path.as_ref())?;
    Ok(parsed.into_ruleset())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "* @a\n/src/ @b @org/core").unwrap();

        let rules = from_path(file.path()).unwrap();
        assert_eq!(rules.rules().len(), 2);
        let owners = rules.owners("src/lib.rs").unwrap();
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].name, "b");
    }

    #[test]
    fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = from_path(dir.path().join("CODEOWNERS")).unwrap_err();
        match err {
            Error::Io(err) => assert_eq!(err.kind(), std::io::ErrorKind::NotFound),
        }
    }
}
