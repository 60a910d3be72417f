//! Glob utilities for treeops
//! Extracted to a separate crate for compilation optimization
//!
//! Supports `*` (one segment), `**` (any segments), `?` (one char), a
//! leading `!` for negation, a trailing `/` for directory-only patterns,
//! and the dotfile policy: entries whose last segment starts with `.` are
//! excluded from wildcard matches unless asked for or named literally.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid glob pattern `{pattern}`: {reason}")]
    Invalid { pattern: String, reason: String },
}

/// Characters that make a pattern a glob rather than a literal path.
const META_CHARS: &[char] = &['*', '?', '[', '{'];

/// Whether a string contains glob metacharacters.
pub fn is_glob(s: &str) -> bool {
    s.contains(META_CHARS)
}

/// Normalize a path to a `/`-separated string with no trailing slash.
pub fn normalize(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    let trimmed = s.trim_end_matches('/');
    if trimmed.is_empty() { s } else { trimmed.to_string() }
}

/// Path relative to `base` as a normalized string; falls back to the full
/// normalized path when `path` is not under `base`.
pub fn rel_str(path: &Path, base: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(rel) => normalize(rel),
        Err(_) => normalize(path),
    }
}

/// Whether the last path segment names a dotfile.
pub fn is_dotfile(rel: &str) -> bool {
    rel.rsplit('/').next().is_some_and(|seg| seg.starts_with('.'))
}

/// One compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    negated: bool,
    dir_only: bool,
    dot_literal: bool,
    literal_root: String,
    is_literal: bool,
    matcher: GlobMatcher,
    // A trailing `/**` also selects the prefix itself: `a/**` matches
    // `a` as well as everything inside it.
    prefix: Option<PrefixMatch>,
    // Only a bare `**` selects the scope root (the empty relative path).
    matches_root: bool,
}

#[derive(Debug, Clone)]
struct PrefixMatch {
    matcher: GlobMatcher,
    is_literal: bool,
    dot_literal: bool,
}

impl Pattern {
    /// Parse and compile a single pattern string.
    pub fn compile(raw: &str) -> Result<Self, PatternError> {
        let mut body = raw.replace('\\', "/");
        let negated = body.starts_with('!');
        if negated {
            body.remove(0);
        }
        if let Some(stripped) = body.strip_prefix("./") {
            body = stripped.to_string();
        }
        let dir_only = body.len() > 1 && body.ends_with('/');
        if dir_only {
            body.pop();
        }

        let matcher = GlobBuilder::new(&body)
            .literal_separator(true)
            .build()
            .map_err(|e| PatternError::Invalid { pattern: raw.to_string(), reason: e.to_string() })?
            .compile_matcher();

        let prefix = match body.strip_suffix("/**") {
            Some(p) if !p.is_empty() => Some(PrefixMatch {
                matcher: GlobBuilder::new(p)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| PatternError::Invalid {
                        pattern: raw.to_string(),
                        reason: e.to_string(),
                    })?
                    .compile_matcher(),
                is_literal: !is_glob(p),
                dot_literal: p.rsplit('/').next().is_some_and(|seg| seg.starts_with('.')),
            }),
            _ => None,
        };

        let dot_literal =
            body.rsplit('/').next().is_some_and(|seg| seg.starts_with('.'));
        let is_literal = !is_glob(&body);
        let literal_root = if is_literal {
            body.clone()
        } else {
            let mut segs: Vec<&str> = Vec::new();
            for seg in body.split('/') {
                if is_glob(seg) {
                    break;
                }
                segs.push(seg);
            }
            segs.join("/")
        };

        let matches_root = body == "**";

        Ok(Self {
            raw: raw.to_string(),
            negated,
            dir_only,
            dot_literal,
            literal_root,
            is_literal,
            matcher,
            prefix,
            matches_root,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Whether the pattern denotes exactly one path (no wildcards).
    pub fn is_literal(&self) -> bool {
        self.is_literal
    }

    /// The longest wildcard-free prefix, `""` when the pattern starts with
    /// a wildcard.
    pub fn literal_root(&self) -> &str {
        &self.literal_root
    }

    fn matches(&self, rel: &str, is_dir: bool, all: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if rel.is_empty() {
            return self.matches_root;
        }
        if self.matcher.is_match(rel) {
            // Wildcard matches never pick up dotfiles unless asked for.
            return all
                || self.negated
                || self.dot_literal
                || self.is_literal
                || !is_dotfile(rel);
        }
        if let Some(prefix) = &self.prefix {
            if prefix.matcher.is_match(rel) {
                return all
                    || self.negated
                    || prefix.dot_literal
                    || prefix.is_literal
                    || !is_dotfile(rel);
            }
        }
        false
    }
}

/// An ordered pattern set. A path is included iff at least one non-negated
/// pattern matches and no negated pattern matches.
#[derive(Debug, Clone)]
pub struct Matcher {
    patterns: Vec<Pattern>,
}

/// Matcher accepting every non-dot entry, used as the default for
/// directory watches.
pub static MATCH_ALL: Lazy<Matcher> =
    Lazy::new(|| Matcher::compile(&["**"]).expect("Invalid builtin pattern"));

impl Matcher {
    pub fn compile(patterns: &[&str]) -> Result<Self, PatternError> {
        let patterns =
            patterns.iter().map(|p| Pattern::compile(p)).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Whether the whole set is a single literal path.
    pub fn as_literal(&self) -> Option<&str> {
        match self.patterns.as_slice() {
            [p] if p.is_literal() && !p.is_negated() => Some(p.literal_root()),
            _ => None,
        }
    }

    /// Test a normalized relative path against the set. Pure function of
    /// its inputs, independent of traversal order.
    pub fn matches(&self, rel: &str, is_dir: bool, all: bool) -> bool {
        let mut included = false;
        for pattern in &self.patterns {
            if pattern.negated {
                if pattern.matches(rel, is_dir, all) {
                    return false;
                }
            } else if !included && pattern.matches(rel, is_dir, all) {
                included = true;
            }
        }
        included
    }

    /// Deduplicated literal roots of the non-negated patterns, relative to
    /// the caller's cwd. `""` means the cwd itself.
    pub fn roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = self
            .patterns
            .iter()
            .filter(|p| !p.negated)
            .map(|p| p.literal_root.clone())
            .collect();
        roots.sort();
        roots.dedup();
        // A nested root is already covered by its ancestor.
        let mut bounded: Vec<String> = Vec::new();
        for root in roots {
            let covered = bounded
                .iter()
                .any(|b| b.is_empty() || root == *b || root.starts_with(&format!("{b}/")));
            if !covered {
                bounded.push(root);
            }
        }
        bounded
    }

    /// Deepest directory guaranteed to contain every match: the shared
    /// prefix of all per-pattern roots.
    pub fn common_root(&self) -> String {
        let roots = self.roots();
        let Some(first) = roots.first() else {
            return String::new();
        };
        let mut common: Vec<&str> = first.split('/').collect();
        for root in &roots[1..] {
            let segs: Vec<&str> = root.split('/').collect();
            let shared = common.iter().zip(&segs).take_while(|(a, b)| a == b).count();
            common.truncate(shared);
        }
        common.join("/")
    }

    /// Resolve the matcher's roots against a base directory.
    pub fn roots_in(&self, base: &Path) -> Vec<PathBuf> {
        self.roots()
            .into_iter()
            .map(|r| if r.is_empty() { base.to_path_buf() } else { base.join(r) })
            .collect()
    }
}
