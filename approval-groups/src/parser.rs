use std::{fs::File, io::Read, path::Path};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::ruleset::{self, Owner};

static OWNER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A[A-Za-z0-9_/-]+\z").expect("valid owner regex"));

/// Parse a CODEOWNERS file from a string. Parsing is tolerant: malformed
/// lines and owner tokens are skipped, never reported as errors. Anything
/// that was discarded is listed in `ParseResult::diagnostics`.
pub fn parse(source: &str) -> ParseResult {
    Parser::new(source).parse()
}

/// Parse a CODEOWNERS file from a file path.
pub fn parse_file(path: &Path) -> std::io::Result<ParseResult> {
    let mut file = File::open(path)?;
    let mut source = String::new();
    file.read_to_string(&mut source)?;
    Ok(parse(&source))
}

/// The rules parsed from a CODEOWNERS file, in file order, plus a note for
/// every token or line that was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseResult {
    pub rules: Vec<ruleset::Rule>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseResult {
    /// Compile the parsed rules into a `RuleSet`. Diagnostics are dropped.
    pub fn into_ruleset(self) -> ruleset::RuleSet {
        ruleset::RuleSet::new(self.rules)
    }
}

/// Something the parser skipped. Diagnostics are informational only and
/// never affect which rules are produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    fn new(line: usize, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            line,
            message: message.into(),
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    rules: Vec<ruleset::Rule>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            rules: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn parse(mut self) -> ParseResult {
        for (idx, raw) in self.source.lines().enumerate() {
            self.parse_line(idx + 1, raw);
        }

        ParseResult {
            rules: self.rules,
            diagnostics: self.diagnostics,
        }
    }

    fn parse_line(&mut self, line: usize, raw: &str) {
        let content = strip_comment(raw.trim()).trim();
        if content.is_empty() {
            return;
        }

        let mut tokens = content.split_whitespace();
        let Some(pattern) = tokens.next() else {
            return;
        };

        let mut owners: Vec<Owner> = Vec::new();
        for token in tokens {
            match parse_owner(token) {
                Some(owner) => {
                    if !owners.contains(&owner) {
                        owners.push(owner);
                    }
                }
                None => {
                    debug!(line, token, "skipping invalid owner");
                    self.diagnostics
                        .push(Diagnostic::new(line, format!("invalid owner: {}", token)));
                }
            }
        }

        if owners.is_empty() {
            debug!(line, pattern, "dropping rule without owners");
            self.diagnostics.push(Diagnostic::new(
                line,
                format!("rule for `{}` has no valid owners", pattern),
            ));
            return;
        }

        self.rules.push(ruleset::Rule {
            pattern: pattern.to_owned(),
            owners,
            order_index: self.rules.len(),
            line,
        });
    }
}

// Everything from the first `#` on is a comment, including a `#` in the
// middle of a token.
fn strip_comment(line: &str) -> &str {
    match memchr::memchr(b'#', line.as_bytes()) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_owner(token: &str) -> Option<Owner> {
    let name = token.strip_prefix('@')?;
    if OWNER_NAME.is_match(name) {
        Some(Owner::new(name))
    } else {
        None
    }
}
