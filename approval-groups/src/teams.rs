//! Team membership resolution.
//!
//! Owners containing a `/` are teams. Their rosters come from an external
//! directory through a [`RosterProvider`]; fetches for distinct teams are
//! independent and run concurrently up to a caller-supplied limit. Any
//! team whose roster cannot be obtained (no provider, fetch error, deadline
//! or cancellation) is recorded as unresolved rather than failing the
//! evaluation.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    future,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{sync::watch, time::Instant};
use tracing::{debug, warn};

use crate::{error::RosterError, grouping::ApprovalGroup, ruleset::Owner};

/// The members of one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRoster {
    pub team: String,
    pub members: Vec<String>,
}

impl TeamRoster {
    pub fn new<I, S>(team: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let members = members
            .into_iter()
            .map(Into::into)
            .filter(|m: &String| seen.insert(m.clone()))
            .collect();
        Self {
            team: team.into(),
            members,
        }
    }

    pub fn contains(&self, user: &str) -> bool {
        self.members.iter().any(|m| m == user)
    }
}

/// Source of team rosters, typically backed by the code host's API.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn fetch_roster(&self, team: &str) -> Result<TeamRoster, RosterError>;
}

/// Rosters held in memory, e.g. loaded from a file.
#[derive(Debug, Clone, Default)]
pub struct StaticRosters {
    rosters: HashMap<String, Vec<String>>,
}

impl StaticRosters {
    pub fn new(rosters: HashMap<String, Vec<String>>) -> Self {
        Self { rosters }
    }
}

impl FromIterator<(String, Vec<String>)> for StaticRosters {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[async_trait]
impl RosterProvider for StaticRosters {
    async fn fetch_roster(&self, team: &str) -> Result<TeamRoster, RosterError> {
        let team = team.trim_start_matches('@');
        self.rosters
            .get(team)
            .map(|members| TeamRoster::new(team, members.iter().cloned()))
            .ok_or_else(|| RosterError::NotFound(team.to_owned()))
    }
}

/// Adapts a synchronous lookup function into a [`RosterProvider`].
pub struct FnRosterProvider<F>(pub F);

#[async_trait]
impl<F> RosterProvider for FnRosterProvider<F>
where
    F: Fn(&str) -> Result<TeamRoster, RosterError> + Send + Sync,
{
    async fn fetch_roster(&self, team: &str) -> Result<TeamRoster, RosterError> {
        (self.0)(team)
    }
}

/// Settings for roster resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    /// Maximum number of roster fetches in flight.
    pub concurrency: usize,
    /// Deadline for the whole resolution, measured from its start. Teams
    /// still pending when it passes are left unresolved.
    pub timeout: Option<Duration>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout: None,
        }
    }
}

/// Cooperative cancellation for roster resolution. Clones share state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            cancelled: Arc::new(tx),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Completes once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum UnresolvedReason {
    NoProvider,
    Cancelled,
    DeadlineExceeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RosterStatus {
    Resolved { members: Vec<String> },
    Unresolved(UnresolvedReason),
}

/// Roster lookup results keyed by team token (without `@`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct TeamRosters(BTreeMap<String, RosterStatus>);

impl TeamRosters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, team: impl Into<String>, status: RosterStatus) {
        self.0.insert(team.into(), status);
    }

    pub fn insert_roster(&mut self, roster: TeamRoster) {
        self.0.insert(
            roster.team,
            RosterStatus::Resolved {
                members: roster.members,
            },
        );
    }

    pub fn get(&self, team: &str) -> Option<&RosterStatus> {
        self.0.get(team)
    }

    /// Members of a resolved team. `None` if the team is unknown or
    /// unresolved.
    pub fn members(&self, team: &str) -> Option<&[String]> {
        match self.0.get(team) {
            Some(RosterStatus::Resolved { members }) => Some(members),
            _ => None,
        }
    }

    pub fn is_resolved(&self, team: &str) -> bool {
        self.members(team).is_some()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, status)| matches!(status, RosterStatus::Unresolved(_)))
            .map(|(team, _)| team.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RosterStatus)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<TeamRoster> for TeamRosters {
    fn from_iter<T: IntoIterator<Item = TeamRoster>>(iter: T) -> Self {
        let mut rosters = TeamRosters::new();
        for roster in iter {
            rosters.insert_roster(roster);
        }
        rosters
    }
}

/// Distinct team tokens owning any of `groups` or requested for review.
/// Requested entries that are not teams (no `/`) are ignored.
pub fn team_tokens<I, S>(groups: &[ApprovalGroup], requested: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let requested = requested
        .into_iter()
        .map(|t| Owner::new(t.as_ref().trim_start_matches('@')))
        .filter(Owner::is_team)
        .map(|o| o.name);

    groups
        .iter()
        .flat_map(|g| g.team_owners().map(|o| o.name.clone()))
        .chain(requested)
        .collect()
}

/// Every team marked unresolved because there is nothing to fetch rosters
/// from.
pub fn without_provider<I, S>(teams: I) -> TeamRosters
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut rosters = TeamRosters::new();
    for team in teams {
        rosters.insert(team, RosterStatus::Unresolved(UnresolvedReason::NoProvider));
    }
    rosters
}

/// Fetch the roster of every team, at most `options.concurrency` at a
/// time. Never fails: a team whose fetch errors, outlives the deadline or
/// is interrupted by `cancel` is recorded as unresolved.
pub async fn resolve_teams<I, S>(
    teams: I,
    provider: &dyn RosterProvider,
    options: &ResolveOptions,
    cancel: &CancellationToken,
) -> TeamRosters
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let teams = teams.into_iter().map(Into::into).collect::<BTreeSet<_>>();
    let deadline = options.timeout.map(|timeout| Instant::now() + timeout);

    debug!(teams = teams.len(), concurrency = options.concurrency, "resolving team rosters");
    let results = stream::iter(teams)
        .map(move |team| async move {
            let status = fetch_roster(provider, &team, deadline, cancel).await;
            (team, status)
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut rosters = TeamRosters::new();
    for (team, status) in results {
        rosters.insert(team, status);
    }
    rosters
}

async fn fetch_roster(
    provider: &dyn RosterProvider,
    team: &str,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
) -> RosterStatus {
    if cancel.is_cancelled() {
        return RosterStatus::Unresolved(UnresolvedReason::Cancelled);
    }

    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!(team, "roster fetch cancelled");
            RosterStatus::Unresolved(UnresolvedReason::Cancelled)
        }
        _ = expired => {
            warn!(team, "roster fetch did not finish before the deadline");
            RosterStatus::Unresolved(UnresolvedReason::DeadlineExceeded)
        }
        result = provider.fetch_roster(team) => match result {
            Ok(roster) => {
                debug!(team, members = roster.members.len(), "resolved roster");
                RosterStatus::Resolved { members: roster.members }
            }
            Err(err) => {
                warn!(team, error = %err, "failed to resolve roster");
                RosterStatus::Unresolved(UnresolvedReason::Failed(err.to_string()))
            }
        },
    }
}
