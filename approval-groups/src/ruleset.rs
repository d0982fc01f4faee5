use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::pattern::Pattern;

/// A single ownership rule: a path pattern and the owners it assigns.
/// Rules are immutable once parsed; their position in the rule file is
/// their precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub pattern: String,
    pub owners: Vec<Owner>,
    /// Position of the rule among the parsed rules. Later rules win.
    pub order_index: usize,
    /// 1-based line in the source file.
    pub line: usize,
}

/// An owner token with the leading `@` stripped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Owner {
    pub name: String,
    pub kind: OwnerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Individual,
    Team,
}

impl Owner {
    pub fn new(name: impl Into<String>) -> Owner {
        let name = name.into();
        let kind = if name.contains('/') {
            OwnerKind::Team
        } else {
            OwnerKind::Individual
        };
        Owner { name, kind }
    }

    pub fn is_team(&self) -> bool {
        self.kind == OwnerKind::Team
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)
    }
}

/// The resolved owners of one file. `owners` is empty and
/// `matched_pattern` is `None` when no rule matched the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFileOwnership {
    pub file: String,
    pub owners: Vec<Owner>,
    pub matched_pattern: Option<String>,
    pub rule_index: Option<usize>,
}

impl ResolvedFileOwnership {
    fn unowned(file: &str) -> Self {
        Self {
            file: file.to_owned(),
            owners: Vec::new(),
            matched_pattern: None,
            rule_index: None,
        }
    }

    /// The matched pattern, or `"none"` when no rule applied.
    pub fn pattern_or_none(&self) -> &str {
        self.matched_pattern.as_deref().unwrap_or("none")
    }
}

/// A parsed rule file with every pattern compiled. Read-only after
/// construction, so a single `RuleSet` can serve any number of concurrent
/// resolutions.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    patterns: Vec<Option<Pattern>>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        let patterns = rules
            .iter()
            .map(|rule| match Pattern::new(&rule.pattern) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    warn!(
                        pattern = %rule.pattern,
                        line = rule.line,
                        error = %err,
                        "pattern does not compile, rule will never match"
                    );
                    None
                }
            })
            .collect();
        Self { rules, patterns }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every rule whose pattern matches `path`, in file order.
    pub fn matching_rules(&self, path: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .zip(&self.patterns)
            .filter(|(_, pattern)| pattern.as_ref().is_some_and(|p| p.is_match(path)))
            .map(|(rule, _)| rule)
            .collect()
    }

    /// The rule that governs `path`: the last matching rule in file order.
    /// Specificity plays no part; a broad rule further down the file
    /// overrides a narrow one above it.
    pub fn matching_rule(&self, path: &str) -> Option<&Rule> {
        let mut last = None;
        for (rule, pattern) in self.rules.iter().zip(&self.patterns) {
            if pattern.as_ref().is_some_and(|p| p.is_match(path)) {
                last = Some(rule);
            }
        }
        last
    }

    pub fn owners(&self, path: &str) -> Option<&[Owner]> {
        self.matching_rule(path).map(|rule| rule.owners.as_slice())
    }

    /// Resolve a single file.
    pub fn resolve_file(&self, file: &str) -> ResolvedFileOwnership {
        match self.matching_rule(file) {
            Some(rule) => {
                debug!(file, pattern = %rule.pattern, rule = rule.order_index, "resolved owners");
                ResolvedFileOwnership {
                    file: file.to_owned(),
                    owners: rule.owners.clone(),
                    matched_pattern: Some(rule.pattern.clone()),
                    rule_index: Some(rule.order_index),
                }
            }
            None => {
                debug!(file, "no matching rule");
                ResolvedFileOwnership::unowned(file)
            }
        }
    }

    /// Resolve every file, returning one entry per input file in input
    /// order.
    #[cfg(not(feature = "rayon"))]
    pub fn resolve<S: AsRef<str>>(&self, files: &[S]) -> Vec<ResolvedFileOwnership> {
        files.iter().map(|f| self.resolve_file(f.as_ref())).collect()
    }

    /// Resolve every file, returning one entry per input file in input
    /// order. Files are matched on the rayon pool.
    #[cfg(feature = "rayon")]
    pub fn resolve<S: AsRef<str> + Sync>(&self, files: &[S]) -> Vec<ResolvedFileOwnership> {
        use rayon::prelude::*;

        files
            .par_iter()
            .map(|f| self.resolve_file(f.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn ruleset(source: &str) -> RuleSet {
        parser::parse(source).into_ruleset()
    }

    fn owner_names(resolved: &ResolvedFileOwnership) -> Vec<&str> {
        resolved.owners.iter().map(|o| o.name.as_str()).collect()
    }

    #[test]
    fn test_owner_kind() {
        assert_eq!(Owner::new("alice").kind, OwnerKind::Individual);
        assert_eq!(Owner::new("org/team").kind, OwnerKind::Team);
        assert_eq!(Owner::new("org/team").to_string(), "@org/team");
    }

    #[test]
    fn test_last_match_wins() {
        let rules = ruleset("* @a\nsrc/ @b\n");
        let resolved = rules.resolve_file("src/x.js");
        assert_eq!(owner_names(&resolved), vec!["b"]);
        assert_eq!(resolved.matched_pattern.as_deref(), Some("src/"));
        assert_eq!(resolved.rule_index, Some(1));
    }

    #[test]
    fn test_broad_rule_later_overrides_narrow_rule() {
        let rules = ruleset("src/ @b\n* @a\n");
        assert_eq!(owner_names(&rules.resolve_file("src/x.js")), vec!["a"]);
    }

    #[test]
    fn test_unmatched_file() {
        let rules = ruleset("docs/ @docs\n");
        let resolved = rules.resolve_file("src/main.rs");
        assert!(resolved.owners.is_empty());
        assert_eq!(resolved.pattern_or_none(), "none");
        assert_eq!(resolved.rule_index, None);
    }

    #[test]
    fn test_resolve_preserves_input_order() {
        let rules = ruleset("*.md @docs\n/src/ @core\n");
        let files = ["src/lib.rs", "README.md", "Cargo.toml", "src/README.md"];
        let resolved = rules.resolve(&files);
        assert_eq!(
            resolved.iter().map(|r| r.file.as_str()).collect::<Vec<_>>(),
            files.to_vec()
        );
        assert_eq!(owner_names(&resolved[0]), vec!["core"]);
        assert_eq!(owner_names(&resolved[1]), vec!["docs"]);
        assert!(resolved[2].owners.is_empty());
        assert_eq!(owner_names(&resolved[3]), vec!["core"]);
    }

    #[test]
    fn test_matching_rules_lists_every_hit() {
        let rules = ruleset("* @a\nsrc/ @b\n*.rs @c\n/docs/ @d\n");
        let hits = rules
            .matching_rules("src/lib.rs")
            .iter()
            .map(|r| r.pattern.as_str())
            .collect::<Vec<_>>();
        assert_eq!(hits, vec!["*", "src/", "*.rs"]);
    }

    #[test]
    fn test_ruleset_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RuleSet>();
    }
}
