use std::collections::HashSet;

use serde::Serialize;

use crate::{
    grouping::{ApprovalGroup, Grouping},
    teams::TeamRosters,
};

/// How, if at all, an approval group has been satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Satisfaction {
    #[default]
    Pending,
    /// An owner approved directly.
    Individual { approver: String },
    /// One or more members of an owning team approved. `members` lists
    /// every approving member, in roster order.
    Team { team: String, members: Vec<String> },
}

impl Satisfaction {
    pub fn is_satisfied(&self) -> bool {
        !matches!(self, Satisfaction::Pending)
    }

    pub fn satisfied_by(&self) -> Option<&str> {
        match self {
            Satisfaction::Pending => None,
            Satisfaction::Individual { approver } => Some(approver),
            Satisfaction::Team { members, .. } => members.first().map(String::as_str),
        }
    }

    pub fn satisfying_team(&self) -> Option<&str> {
        match self {
            Satisfaction::Team { team, .. } => Some(team),
            _ => None,
        }
    }

    pub fn via(&self) -> Option<&'static str> {
        match self {
            Satisfaction::Pending => None,
            Satisfaction::Individual { .. } => Some("individual"),
            Satisfaction::Team { .. } => Some("team"),
        }
    }
}

/// Outcome of checking a change set against its approvals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Report {
    pub groups: Vec<ApprovalGroup>,
    pub unowned_files: Vec<String>,
    /// Number of unsatisfied groups, i.e. the minimum number of further
    /// approvals needed.
    pub groups_needing_approval: usize,
    /// True only if at least one group exists and all are satisfied. A
    /// change that no rule covers is not ready by default.
    pub ready_to_merge: bool,
    pub teams: TeamRosters,
}

impl Report {
    pub fn pending_groups(&self) -> impl Iterator<Item = &ApprovalGroup> {
        self.groups.iter().filter(|g| !g.is_satisfied())
    }

    /// Unsatisfied groups with an owning team whose roster is unknown.
    /// Their pending state may be a false negative.
    pub fn low_confidence_groups(&self) -> impl Iterator<Item = &ApprovalGroup> {
        self.pending_groups()
            .filter(|g| !g.unresolved_teams.is_empty())
    }
}

/// Decide for each group whether the current approvals satisfy it.
///
/// Owners are tried in group order. An owner whose name is an approver
/// satisfies the group directly; a team owner satisfies it if any approver
/// is on its resolved roster. The first satisfying owner wins. Team
/// membership is only ever decided from the roster, never from names.
pub fn compute_satisfaction<S: AsRef<str>>(
    grouping: Grouping,
    approvals: &[S],
    rosters: &TeamRosters,
) -> Report {
    let approvers = approvals
        .iter()
        .map(|a| a.as_ref().trim_start_matches('@'))
        .filter(|a| !a.is_empty())
        .collect::<HashSet<_>>();

    let groups = grouping
        .groups
        .into_iter()
        .map(|mut group| {
            group.unresolved_teams = group
                .team_owners()
                .filter(|o| !rosters.is_resolved(&o.name))
                .map(|o| o.name.clone())
                .collect();
            group.satisfaction = satisfy(&group, &approvers, rosters);
            group
        })
        .collect::<Vec<_>>();

    let groups_needing_approval = groups.iter().filter(|g| !g.is_satisfied()).count();
    let ready_to_merge = groups_needing_approval == 0 && !groups.is_empty();

    Report {
        groups,
        unowned_files: grouping.unowned_files,
        groups_needing_approval,
        ready_to_merge,
        teams: rosters.clone(),
    }
}

fn satisfy(
    group: &ApprovalGroup,
    approvers: &HashSet<&str>,
    rosters: &TeamRosters,
) -> Satisfaction {
    for owner in &group.owners {
        if approvers.contains(owner.name.as_str()) {
            return Satisfaction::Individual {
                approver: owner.name.clone(),
            };
        }
        if !owner.is_team() {
            continue;
        }
        let Some(roster) = rosters.members(&owner.name) else {
            continue;
        };
        let members = roster
            .iter()
            .filter(|m| approvers.contains(m.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        if !members.is_empty() {
            return Satisfaction::Team {
                team: owner.name.clone(),
                members,
            };
        }
    }
    Satisfaction::Pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{grouping::group_by_ownership, parser, teams::TeamRoster};

    fn report(rules: &str, files: &[&str], approvals: &[&str], rosters: &TeamRosters) -> Report {
        let resolved = parser::parse(rules).into_ruleset().resolve(files);
        compute_satisfaction(group_by_ownership(&resolved), approvals, rosters)
    }

    #[test]
    fn test_scenario_global_and_docs() {
        let r = report(
            "* @global\ndocs/ @docs-team\n",
            &["a.js", "docs/readme.md"],
            &["global"],
            &TeamRosters::new(),
        );

        assert_eq!(r.groups.len(), 2);
        let docs = &r.groups[0];
        let global = &r.groups[1];
        assert_eq!(docs.key, "docs-team");
        assert_eq!(docs.satisfaction, Satisfaction::Pending);
        assert_eq!(global.key, "global");
        assert_eq!(global.satisfied_by(), Some("global"));
        assert_eq!(global.satisfaction.via(), Some("individual"));
        assert_eq!(r.groups_needing_approval, 1);
        assert!(!r.ready_to_merge);
    }

    #[test]
    fn test_team_satisfaction_lists_all_approving_members() {
        let rosters = TeamRosters::from_iter([TeamRoster::new(
            "org/team",
            ["alice", "bob", "carol"],
        )]);
        let r = report("* @org/team\n", &["x.rs"], &["carol", "bob", "mallory"], &rosters);

        let group = &r.groups[0];
        assert_eq!(
            group.satisfaction,
            Satisfaction::Team {
                team: "org/team".to_owned(),
                members: vec!["bob".to_owned(), "carol".to_owned()],
            }
        );
        assert_eq!(group.satisfied_by(), Some("bob"));
        assert_eq!(group.satisfaction.satisfying_team(), Some("org/team"));
        assert!(r.ready_to_merge);
    }

    #[test]
    fn test_single_team_member_approval() {
        let rosters = TeamRosters::from_iter([TeamRoster::new("org/team", ["alice", "bob"])]);
        let r = report("* @org/team\n", &["x.rs"], &["bob"], &rosters);
        assert_eq!(r.groups[0].satisfaction.via(), Some("team"));
        assert_eq!(
            r.groups[0].satisfaction,
            Satisfaction::Team {
                team: "org/team".to_owned(),
                members: vec!["bob".to_owned()],
            }
        );
    }

    #[test]
    fn test_first_satisfying_owner_wins() {
        let rosters = TeamRosters::from_iter([TeamRoster::new("org/web", ["zoe"])]);
        let r = report("* @zoe @org/web\n", &["x.rs"], &["zoe"], &rosters);
        // `org/web` sorts before `zoe`, so the team is tried first
        assert_eq!(r.groups[0].satisfaction.via(), Some("team"));
    }

    #[test]
    fn test_unresolved_team_is_flagged() {
        let mut rosters = TeamRosters::new();
        rosters.insert(
            "org/infra",
            crate::teams::RosterStatus::Unresolved(crate::teams::UnresolvedReason::NoProvider),
        );
        let r = report("/infra/ @org/infra\n", &["infra/main.tf"], &["alice"], &rosters);

        assert_eq!(r.groups_needing_approval, 1);
        assert_eq!(r.groups[0].unresolved_teams, vec!["org/infra"]);
        assert_eq!(
            r.low_confidence_groups().map(|g| g.key.as_str()).collect::<Vec<_>>(),
            vec!["org/infra"]
        );
    }

    #[test]
    fn test_team_absent_from_rosters_is_unresolved() {
        let r = report("* @org/infra @ops\n", &["x"], &["ops"], &TeamRosters::new());
        assert!(r.groups[0].is_satisfied());
        assert_eq!(r.groups[0].unresolved_teams, vec!["org/infra"]);
        assert_eq!(r.low_confidence_groups().count(), 0);
    }

    #[test]
    fn test_no_suffix_matching_of_team_names() {
        let rosters = TeamRosters::from_iter([
            TeamRoster::new("org/platform-web", ["alice"]),
            TeamRoster::new("org/web", ["bob"]),
        ]);
        let r = report("* @org/web\n", &["x"], &["alice"], &rosters);
        assert!(!r.groups[0].is_satisfied());
    }

    #[test]
    fn test_empty_rules_are_not_ready() {
        let r = report("", &["a.js"], &["anyone"], &TeamRosters::new());
        assert!(r.groups.is_empty());
        assert_eq!(r.groups_needing_approval, 0);
        assert!(!r.ready_to_merge);
        assert_eq!(r.unowned_files, vec!["a.js"]);
    }

    #[test]
    fn test_approvals_are_a_set() {
        let r = report("* @a\n", &["x"], &["@a", "a", "a"], &TeamRosters::new());
        assert!(r.ready_to_merge);
    }

    #[test]
    fn test_report_json() {
        let rosters = TeamRosters::from_iter([TeamRoster::new("org/team", ["alice", "bob"])]);
        let r = report(
            "* @lead\n/web/ @org/team\n",
            &["web/app.ts", "Makefile"],
            &["bob"],
            &rosters,
        );
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["groups_needing_approval"], 1);
        assert_eq!(json["ready_to_merge"], false);
        assert_eq!(json["unowned_files"], serde_json::json!([]));
        assert_eq!(json["groups"][0]["key"], "lead");
        assert_eq!(json["groups"][0]["satisfaction"], serde_json::json!({"via": "pending"}));

        let team = &json["groups"][1];
        assert_eq!(team["key"], "org/team");
        assert_eq!(team["files"], serde_json::json!(["web/app.ts"]));
        assert_eq!(
            team["owners"],
            serde_json::json!([{"name": "org/team", "kind": "team"}])
        );
        assert_eq!(
            team["satisfaction"],
            serde_json::json!({"via": "team", "team": "org/team", "members": ["bob"]})
        );
        assert_eq!(
            json["teams"],
            serde_json::json!({"org/team": {"status": "resolved", "members": ["alice", "bob"]}})
        );
    }
}
