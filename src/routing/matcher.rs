//! Route matching logic.
//!
//! # Responsibilities
//! - Compare a request target (path plus query) against a route prefix
//!
//! # Design Decisions
//! - Matching is case-sensitive
//! - No regex; a literal comparison per rule
//! - `PathPrefixMatcher` is a raw `starts_with`, `SegmentPrefixMatcher`
//!   additionally requires a boundary after the prefix

use crate::config::MatchMode;

/// Trait for matching request targets against a rule.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the target matches this rule.
    fn matches(&self, target: &str) -> bool;
}

/// Matches any target that starts with the prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, target: &str) -> bool {
        target.starts_with(&self.prefix)
    }
}

/// Matches the prefix only when it ends at a segment boundary.
///
/// `/socket.io` matches `/socket.io`, `/socket.io/x` and `/socket.io?EIO=4`
/// but not `/socket.io-evil`.
#[derive(Debug, Clone)]
pub struct SegmentPrefixMatcher {
    prefix: String,
}

impl SegmentPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for SegmentPrefixMatcher {
    fn matches(&self, target: &str) -> bool {
        match target.strip_prefix(self.prefix.as_str()) {
            Some(rest) => {
                self.prefix.ends_with('/')
                    || rest.is_empty()
                    || rest.starts_with('/')
                    || rest.starts_with('?')
            }
            None => false,
        }
    }
}

/// Build the matcher for a prefix under the given mode.
pub fn compile(prefix: &str, mode: MatchMode) -> Box<dyn Matcher> {
    match mode {
        MatchMode::Prefix => Box::new(PathPrefixMatcher::new(prefix)),
        MatchMode::Segment => Box::new(SegmentPrefixMatcher::new(prefix)),
    }
}
