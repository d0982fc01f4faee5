use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    ruleset::{Owner, ResolvedFileOwnership},
    satisfaction::Satisfaction,
};

// Owner names are restricted to `[A-Za-z0-9_/-]`, so a comma can never
// appear inside one.
const KEY_SEPARATOR: &str = ",";

/// A set of changed files that all resolve to exactly the same owners and
/// therefore need a single approval between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalGroup {
    /// Owner names sorted and joined; identifies the group.
    pub key: String,
    /// Short human-readable name derived from the group's pattern.
    pub label: String,
    /// Owners in sorted order. This is also the order in which owners are
    /// tried when checking satisfaction.
    pub owners: Vec<Owner>,
    /// Files in input order.
    pub files: Vec<String>,
    /// Distinct patterns that resolved files into this group, ordered by
    /// rule precedence.
    pub patterns: Vec<String>,
    pub satisfaction: Satisfaction,
    /// Team owners whose roster could not be resolved.
    pub unresolved_teams: Vec<String>,
}

impl ApprovalGroup {
    pub fn is_satisfied(&self) -> bool {
        self.satisfaction.is_satisfied()
    }

    /// The individual approver, or the team, that satisfied this group.
    pub fn satisfied_by(&self) -> Option<&str> {
        self.satisfaction.satisfied_by()
    }

    pub fn team_owners(&self) -> impl Iterator<Item = &Owner> {
        self.owners.iter().filter(|o| o.is_team())
    }
}

/// The result of grouping resolved files by owner set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Grouping {
    pub groups: Vec<ApprovalGroup>,
    /// Files no rule matched. They impose no approval requirement.
    pub unowned_files: Vec<String>,
}

impl Grouping {
    pub fn file_count(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum::<usize>() + self.unowned_files.len()
    }
}

/// Canonical key for an owner set: names sorted, de-duplicated and joined.
pub fn owner_set_key(owners: &[Owner]) -> String {
    let mut names = owners.iter().map(|o| o.name.as_str()).collect::<Vec<_>>();
    names.sort_unstable();
    names.dedup();
    names.join(KEY_SEPARATOR)
}

#[derive(Default)]
struct Bucket {
    owners: Vec<Owner>,
    files: Vec<String>,
    patterns: BTreeMap<usize, String>,
}

/// Bucket resolved files by identical owner sets. Groups come out ordered
/// by key so that the result does not depend on the order of the input
/// files; files keep their input order inside each group.
pub fn group_by_ownership(resolved: &[ResolvedFileOwnership]) -> Grouping {
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
    let mut unowned_files = Vec::new();

    for entry in resolved {
        if entry.owners.is_empty() {
            unowned_files.push(entry.file.clone());
            continue;
        }

        let bucket = buckets.entry(owner_set_key(&entry.owners)).or_default();
        if bucket.owners.is_empty() {
            let mut owners = entry.owners.clone();
            owners.sort();
            owners.dedup();
            bucket.owners = owners;
        }
        bucket.files.push(entry.file.clone());
        if let (Some(idx), Some(pattern)) = (entry.rule_index, &entry.matched_pattern) {
            bucket.patterns.entry(idx).or_insert_with(|| pattern.clone());
        }
    }

    let groups = buckets
        .into_iter()
        .map(|(key, bucket)| {
            let patterns = bucket.patterns.into_values().collect::<Vec<_>>();
            let label = patterns
                .first()
                .map(|p| group_label(p))
                .unwrap_or_else(|| key.clone());
            ApprovalGroup {
                key,
                label,
                owners: bucket.owners,
                files: bucket.files,
                patterns,
                satisfaction: Satisfaction::Pending,
                unresolved_teams: Vec::new(),
            }
        })
        .collect();

    Grouping {
        groups,
        unowned_files,
    }
}

/// Derive a short label for a pattern, e.g. `docs` for `/docs/`,
/// `md_files` for `*.md` and `global` for `*`.
pub fn group_label(pattern: &str) -> String {
    let directory = pattern.ends_with('/');
    let trimmed = pattern.trim_matches('/');
    let segments = trimmed
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    if segments.iter().all(|s| *s == "*" || *s == "**") {
        return "global".to_owned();
    }

    // `a/b/**/CMakeLists.txt` is about `b`
    if let Some(pos) = segments.iter().position(|s| *s == "**") {
        if let Some(name) = segments[..pos].iter().rev().find(|s| !is_wild(s)) {
            return clean_label(name);
        }
    }

    if let Some(ext) = segments.last().and_then(|s| s.strip_prefix("*.")) {
        if !is_wild(ext) {
            return format!("{}_files", ext);
        }
    }

    match segments.iter().rposition(|s| !is_wild(s)) {
        Some(pos) if directory || pos + 1 < segments.len() => clean_label(segments[pos]),
        Some(pos) => clean_label(file_stem(segments[pos])),
        None => "global".to_owned(),
    }
}

fn is_wild(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

fn file_stem(name: &str) -> &str {
    let name = name.trim_start_matches('.');
    match name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

fn clean_label(name: &str) -> String {
    name.trim_start_matches('.').to_owned()
}
