use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    grouping::{group_by_ownership, Grouping},
    parser::{self, Diagnostic, ParseResult},
    ruleset::{ResolvedFileOwnership, RuleSet},
    satisfaction::{compute_satisfaction, Report},
    teams::{self, CancellationToken, ResolveOptions, RosterProvider},
};

/// What the pull-request provider knows about a change.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequestSnapshot {
    pub changed_files: Vec<String>,
    pub approvals: Vec<String>,
    pub requested_reviewers: Vec<String>,
    pub requested_teams: Vec<String>,
}

/// Evaluates change sets against one parsed rule file. Cheap to clone; the
/// compiled rules are shared between clones and concurrent evaluations.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    rules: Arc<RuleSet>,
    diagnostics: Arc<Vec<Diagnostic>>,
}

impl Engine {
    /// Build an engine from rule file contents. `None` means the repository
    /// has no rule file, which yields no approval groups at all.
    pub fn new(rule_text: Option<&str>) -> Self {
        Self::from_parsed(rule_text.map(parser::parse).unwrap_or_default())
    }

    pub fn from_parsed(parsed: ParseResult) -> Self {
        Self {
            diagnostics: Arc::new(parsed.diagnostics.clone()),
            rules: Arc::new(parsed.into_ruleset()),
        }
    }

    pub fn from_ruleset(rules: RuleSet) -> Self {
        Self {
            rules: Arc::new(rules),
            diagnostics: Arc::default(),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn resolve<S: AsRef<str> + Sync>(&self, files: &[S]) -> Vec<ResolvedFileOwnership> {
        self.rules.resolve(files)
    }

    pub fn group<S: AsRef<str> + Sync>(&self, files: &[S]) -> Grouping {
        group_by_ownership(&self.resolve(files))
    }

    /// Run the whole pipeline for a pull request: resolve owners, group
    /// files, fetch rosters for every team involved and check the current
    /// approvals. Without a roster provider every team stays unresolved.
    pub async fn evaluate(
        &self,
        pr: &PullRequestSnapshot,
        provider: Option<&dyn RosterProvider>,
        options: &ResolveOptions,
        cancel: &CancellationToken,
    ) -> Report {
        let grouping = self.group(&pr.changed_files);
        let requested = pr.requested_reviewers.iter().chain(&pr.requested_teams);
        let tokens = teams::team_tokens(&grouping.groups, requested);

        let rosters = match provider {
            Some(provider) => teams::resolve_teams(tokens, provider, options, cancel).await,
            None => teams::without_provider(tokens),
        };

        let report = compute_satisfaction(grouping, &pr.approvals, &rosters);
        info!(
            files = pr.changed_files.len(),
            groups = report.groups.len(),
            unowned = report.unowned_files.len(),
            needing_approval = report.groups_needing_approval,
            ready = report.ready_to_merge,
            "evaluated approvals"
        );
        report
    }
}

/// Parse `rule_text` and resolve the owners of every file.
pub fn resolve_ownership<S: AsRef<str> + Sync>(
    rule_text: &str,
    files: &[S],
) -> Vec<ResolvedFileOwnership> {
    parser::parse(rule_text).into_ruleset().resolve(files)
}
