//! Pathspec matching for file filtering.
//!
//! Supports magic signatures: `:(top)`, `:(exclude)` / `:!` / `:^`,
//! `:(icase)`, `:(glob)`, `:(literal)`.

use bstr::{BStr, ByteSlice};
use glob::{MatchOptions, Pattern};

use crate::IndexError;

/// Decides whether a repository-relative path is selected by a pattern.
///
/// For an exclude pattern (see [`PathspecMatcher::is_exclude`]), `matches`
/// answers whether the path falls under the exclusion.
pub trait PathspecMatcher: Send + Sync {
    fn matches(&self, pattern: &str, path: &BStr) -> bool;

    fn is_exclude(&self, pattern: &str) -> bool {
        PathspecPattern::parse(pattern)
            .map(|p| p.magic.exclude)
            .unwrap_or(false)
    }

    /// Reject malformed patterns before any path is visited.
    fn validate(&self, _pattern: &str) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Magic signature flags for pathspecs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathspecMagic {
    /// Relative to the repository root. Paths here always are.
    pub top: bool,
    pub exclude: bool,
    pub icase: bool,
    pub glob: bool,
    /// No wildcard expansion.
    pub literal: bool,
}

/// A pattern split into its magic and the text after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathspecPattern<'a> {
    pub pattern: &'a str,
    pub magic: PathspecMagic,
}

impl<'a> PathspecPattern<'a> {
    pub fn parse(input: &'a str) -> Result<Self, IndexError> {
        let mut magic = PathspecMagic::default();

        let pattern = if let Some(rest) = input.strip_prefix(":(") {
            let close = rest
                .find(')')
                .ok_or_else(|| IndexError::InvalidPathspec(format!("unclosed magic in '{input}'")))?;
            for word in rest[..close].split(',') {
                match word.trim() {
                    "top" => magic.top = true,
                    "exclude" => magic.exclude = true,
                    "icase" => magic.icase = true,
                    "glob" => magic.glob = true,
                    "literal" => magic.literal = true,
                    "" => {}
                    other => {
                        return Err(IndexError::InvalidPathspec(format!(
                            "unknown magic '{other}' in '{input}'"
                        )))
                    }
                }
            }
            &rest[close + 1..]
        } else if let Some(rest) = input.strip_prefix(":!").or_else(|| input.strip_prefix(":^")) {
            magic.exclude = true;
            rest
        } else if let Some(rest) = input.strip_prefix(":/") {
            magic.top = true;
            rest
        } else {
            input
        };

        if magic.literal && magic.glob {
            return Err(IndexError::InvalidPathspec(format!(
                "'literal' and 'glob' are incompatible in '{input}'"
            )));
        }
        Ok(Self { pattern, magic })
    }

    fn has_wildcards(&self) -> bool {
        !self.magic.literal && self.pattern.contains(['*', '?', '['])
    }
}

/// Glob-based pathspec matching.
///
/// `*` and `?` stay within one path component, `**/` spans directories, and a
/// pattern without wildcards selects that exact path or everything below it.
/// The empty pattern and `.` select every path.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobMatcher;

impl GlobMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl PathspecMatcher for GlobMatcher {
    fn matches(&self, pattern: &str, path: &BStr) -> bool {
        let Ok(spec) = PathspecPattern::parse(pattern) else {
            return false;
        };
        let body = spec.pattern.trim_end_matches('/');
        if body.is_empty() || body == "." {
            return true;
        }

        let path = path.to_str_lossy();
        if prefix_match(body, &path, spec.magic.icase) {
            return true;
        }
        if !spec.has_wildcards() {
            return false;
        }

        let Ok(glob) = Pattern::new(body) else {
            return false;
        };
        let options = MatchOptions {
            case_sensitive: !spec.magic.icase,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        // A pattern that selects a directory selects everything inside it.
        let hit = leading_dirs(&path).any(|candidate| glob.matches_with(candidate, options));
        hit
    }

    fn validate(&self, pattern: &str) -> Result<(), IndexError> {
        let spec = PathspecPattern::parse(pattern)?;
        if spec.has_wildcards() {
            Pattern::new(spec.pattern.trim_end_matches('/'))
                .map_err(|e| IndexError::InvalidPathspec(format!("'{pattern}': {e}")))?;
        }
        Ok(())
    }
}

/// `path` equals `body` or lies below the directory `body`.
fn prefix_match(body: &str, path: &str, icase: bool) -> bool {
    if path.len() < body.len() || !path.is_char_boundary(body.len()) {
        return false;
    }
    let (head, tail) = path.split_at(body.len());
    let head_matches = if icase {
        head.eq_ignore_ascii_case(body)
    } else {
        head == body
    };
    head_matches && (tail.is_empty() || tail.starts_with('/'))
}

/// `a/b/c` yields `a/b/c`, `a/b`, `a`.
fn leading_dirs(path: &str) -> impl Iterator<Item = &str> {
    std::iter::once(path).chain(
        path.rmatch_indices('/')
            .map(move |(i, _)| &path[..i]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, path: &str) -> bool {
        GlobMatcher.matches(pattern, BStr::new(path))
    }

    #[test]
    fn parse_magic() {
        let p = PathspecPattern::parse(":(exclude,icase)*.TXT").unwrap();
        assert!(p.magic.exclude && p.magic.icase);
        assert_eq!(p.pattern, "*.TXT");

        assert!(PathspecPattern::parse(":!*.test").unwrap().magic.exclude);
        assert!(PathspecPattern::parse(":^*.test").unwrap().magic.exclude);
        assert!(PathspecPattern::parse(":(top)README").unwrap().magic.top);
        assert!(PathspecPattern::parse(":(bogus)x").is_err());
        assert!(PathspecPattern::parse(":(glob").is_err());
    }

    #[test]
    fn match_glob() {
        assert!(m("*.txt", "a.txt"));
        assert!(!m("*.txt", "dir/a.txt"));
        assert!(m("src/*.rs", "src/main.rs"));
        assert!(!m("src/*.rs", "src/sub/main.rs"));
        assert!(!m("src/*.rs", "lib/main.rs"));
        assert!(m("**/*.rs", "a/b/c.rs"));
        assert!(m("src/*", "src/sub/deep.rs"));
    }

    #[test]
    fn match_prefix() {
        assert!(m("src", "src"));
        assert!(m("src", "src/main.rs"));
        assert!(m("src/", "src/sub/file.rs"));
        assert!(!m("src", "srcfile"));
        assert!(!m("src", "lib/main.rs"));
    }

    #[test]
    fn empty_and_dot_match_everything() {
        assert!(m("", "anything/at/all"));
        assert!(m(".", "x"));
    }

    #[test]
    fn icase_and_literal() {
        assert!(m(":(icase)README.md", "readme.md"));
        assert!(!m("README.md", "readme.md"));
        assert!(m(":(literal)a*b", "a*b"));
        assert!(!m(":(literal)a*b", "axxb"));
        assert!(m("a*b", "axxb"));
    }

    #[test]
    fn exclude_detection() {
        assert!(GlobMatcher.is_exclude(":!*.log"));
        assert!(GlobMatcher.is_exclude(":(exclude)build"));
        assert!(!GlobMatcher.is_exclude("*.log"));
        assert!(m(":!*.log", "x.log"));
    }

    #[test]
    fn validate_rejects_bad_patterns() {
        assert!(GlobMatcher.validate("*.rs").is_ok());
        assert!(GlobMatcher.validate("[").is_err());
        assert!(GlobMatcher.validate(":(nope)x").is_err());
    }
}
