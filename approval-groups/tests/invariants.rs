use std::collections::{BTreeMap, BTreeSet};

use approval_groups::{
    compute_satisfaction, group_by_ownership, parser, resolve_ownership, Grouping, TeamRosters,
};
use proptest::prelude::*;

const RULES: &str = "\
# catch-all
* @global
*.md @docs @writers
/docs/ @writers @docs
src/ @core
/src/*.rs @core @org/rust
**/tests/** @qa
/*  @root-owner
vendor/ not-an-owner
";

fn path_strategy() -> impl Strategy<Value = String> {
    let segment = prop::sample::select(vec!["src", "docs", "tests", "vendor", "lib", "a", "b"]);
    let file = prop::sample::select(vec!["mod.rs", "README.md", "index.js", "x", "Makefile"]);
    (prop::collection::vec(segment, 0..4), file).prop_map(|(dirs, file)| {
        let mut parts = dirs.into_iter().map(str::to_owned).collect::<Vec<_>>();
        parts.push(file.to_owned());
        parts.join("/")
    })
}

fn grouping_for(files: &[String]) -> Grouping {
    group_by_ownership(&resolve_ownership(RULES, files))
}

fn membership(grouping: &Grouping) -> BTreeMap<String, BTreeSet<String>> {
    grouping
        .groups
        .iter()
        .map(|g| (g.key.clone(), g.files.iter().cloned().collect()))
        .collect()
}

proptest! {
    #[test]
    fn every_file_is_accounted_for(files in prop::collection::vec(path_strategy(), 0..40)) {
        let grouping = grouping_for(&files);
        let grouped: usize = grouping.groups.iter().map(|g| g.files.len()).sum();
        prop_assert_eq!(grouped + grouping.unowned_files.len(), files.len());
    }

    #[test]
    fn permuting_files_keeps_group_membership(
        files in prop::collection::vec(path_strategy(), 0..40),
        seed in any::<u64>(),
    ) {
        let mut shuffled = files.clone();
        // Deterministic Fisher-Yates driven by the generated seed
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            shuffled.swap(i, (state % (i as u64 + 1)) as usize);
        }

        let original = grouping_for(&files);
        let permuted = grouping_for(&shuffled);
        prop_assert_eq!(original.groups.len(), permuted.groups.len());
        prop_assert_eq!(membership(&original), membership(&permuted));
        prop_assert_eq!(
            original.groups.iter().map(|g| &g.key).collect::<Vec<_>>(),
            permuted.groups.iter().map(|g| &g.key).collect::<Vec<_>>()
        );
    }

    #[test]
    fn resolution_is_deterministic(files in prop::collection::vec(path_strategy(), 0..40)) {
        prop_assert_eq!(resolve_ownership(RULES, &files), resolve_ownership(RULES, &files));
    }

    #[test]
    fn ready_implies_every_group_satisfied(
        files in prop::collection::vec(path_strategy(), 0..20),
        approvals in prop::collection::vec(
            prop::sample::select(vec!["global", "docs", "core", "qa", "root-owner", "nobody"]),
            0..4,
        ),
    ) {
        let report = compute_satisfaction(grouping_for(&files), &approvals, &TeamRosters::new());
        prop_assert_eq!(
            report.groups_needing_approval,
            report.groups.iter().filter(|g| !g.is_satisfied()).count()
        );
        prop_assert_eq!(
            report.ready_to_merge,
            !report.groups.is_empty() && report.groups.iter().all(|g| g.is_satisfied())
        );
    }
}

#[test]
fn parser_drops_rules_without_owners() {
    let parsed = parser::parse(RULES);
    assert!(parsed.rules.iter().all(|r| !r.owners.is_empty()));
    assert!(parsed.rules.iter().all(|r| r.pattern != "vendor/"));
}

#[test]
fn root_star_only_owns_top_level_files() {
    let resolved = resolve_ownership("/* @root\n", &["README.md", "src/index.js"]);
    assert_eq!(resolved[0].owners[0].name, "root");
    assert!(resolved[1].owners.is_empty());
    assert_eq!(resolved[1].pattern_or_none(), "none");
}

#[test]
fn last_matching_rule_wins() {
    let resolved = resolve_ownership("* @a\nsrc/ @b\n", &["src/x.js"]);
    let owners = resolved[0]
        .owners
        .iter()
        .map(|o| o.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(owners, vec!["b"]);
}
