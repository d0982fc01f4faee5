/// A compiled CODEOWNERS pattern.
///
/// Patterns follow the CODEOWNERS flavour of gitignore globbing:
///
/// * a leading `/` anchors the pattern at the repository root; without it
///   the pattern may start at any path segment;
/// * a trailing `/` matches everything inside a directory;
/// * a pattern without wildcards matches the path itself and anything
///   below it;
/// * `**` spans any number of segments, `*` stays within one segment and
///   `?` matches a single non-`/` character;
/// * a pattern whose final segment is a lone `*` is not recursive, so `/*`
///   only matches files at the root.
///
/// Matching is case-sensitive and always considers the full path.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    condition: Condition,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Pattern, regex::Error> {
        let condition = if has_wildcard(pattern.chars()) {
            Condition::Regex(pattern_to_regex(pattern)?)
        } else {
            Condition::literal(pattern)
        };
        Ok(Pattern {
            source: pattern.to_owned(),
            condition,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.condition.is_match(path)
    }
}

// Most patterns in real CODEOWNERS files are plain paths, which we can
// match with string comparisons instead of going through the regex engine.
#[derive(Debug, Clone)]
enum Condition {
    Literal {
        path: String,
        anchored: bool,
        directory: bool,
    },
    Regex(regex::Regex),
}

impl Condition {
    fn literal(pattern: &str) -> Self {
        let (pattern, anchored) = match pattern.strip_prefix('/') {
            Some(pattern) => (pattern, true),
            None => (pattern, false),
        };
        let (pattern, directory) = match pattern.strip_suffix('/') {
            Some(pattern) => (pattern, true),
            None => (pattern, false),
        };
        Self::Literal {
            path: pattern.to_owned(),
            anchored,
            directory,
        }
    }

    fn is_match(&self, candidate: &str) -> bool {
        match self {
            Self::Literal {
                path,
                anchored,
                directory,
            } => {
                let below_root = candidate
                    .strip_prefix(path.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));
                if below_root || (!directory && candidate == path) {
                    return true;
                }
                if *anchored {
                    return false;
                }

                let mut nested = String::with_capacity(path.len() + 2);
                nested.push('/');
                nested.push_str(path);
                if !directory && candidate.ends_with(&nested) {
                    return true;
                }
                nested.push('/');
                memchr::memmem::find(candidate.as_bytes(), nested.as_bytes()).is_some()
            }
            Self::Regex(re) => re.is_match(candidate),
        }
    }
}

fn pattern_to_regex(pattern: &str) -> Result<regex::Regex, regex::Error> {
    let (pattern, anchored) = match pattern.strip_prefix('/') {
        Some(pattern) => (pattern, true),
        None => (pattern, false),
    };
    let (pattern, directory) = match pattern.strip_suffix('/') {
        Some(pattern) => (pattern, true),
        None => (pattern, false),
    };

    let segments = pattern.split('/').collect::<Vec<_>>();
    let last = segments.len() - 1;

    let mut regex = String::with_capacity(pattern.len() * 2 + 16);
    regex.push_str(r"\A");
    if !anchored {
        regex.push_str("(?:.*/)?");
    }

    for (idx, segment) in segments.iter().enumerate() {
        // `**` has to be handled as a whole segment before single stars are
        // translated, otherwise it degrades into two `[^/]*` runs.
        if *segment == "**" {
            if idx == last {
                regex.push_str(".*");
            } else {
                regex.push_str("(?:.*/)?");
            }
            continue;
        }
        push_segment(&mut regex, segment);
        if idx != last {
            regex.push('/');
        }
    }

    let last_segment = segments[last];
    if directory {
        regex.push_str("/.*");
    } else if last_segment != "*" && last_segment != "**" {
        // Anything below a matched path is matched too
        regex.push_str("(?:/.*)?");
    }
    regex.push_str(r"\z");

    regex::Regex::new(&regex)
}

fn push_segment(regex: &mut String, segment: &str) {
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => push_literal(regex, chars.next().unwrap_or('\\')),
            '*' => {
                if chars.peek() == Some(&'*') {
                    while chars.peek() == Some(&'*') {
                        chars.next();
                    }
                    regex.push_str(".*");
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            _ => push_literal(regex, c),
        }
    }
}

fn push_literal(regex: &mut String, c: char) {
    if regex_syntax::is_meta_character(c) {
        regex.push('\\');
    }
    regex.push(c);
}

fn has_wildcard(mut char_iter: impl Iterator<Item = char>) -> bool {
    char_iter.any(|c| c == '*' || c == '?' || c == '\\')
}
