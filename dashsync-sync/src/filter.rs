//! Path filter over `folder/title`.
//!
//! Matching is unanchored: a pattern matches when it is found anywhere in the
//! joined path. `"teamA/"` therefore also selects a dashboard titled
//! `"teamA/old"` in folder `"teamB"`.

use regex::Regex;

use crate::SyncError;

/// A compiled path filter. Without a pattern every path matches.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    regex: Option<Regex>,
}

impl PathFilter {
    /// Compile `pattern`; `None` or an empty string yields the match-all filter.
    pub fn compile(pattern: Option<&str>) -> Result<Self, SyncError> {
        let regex = match pattern {
            None | Some("") => None,
            Some(pattern) => {
                Some(
                    Regex::new(pattern).map_err(|source| SyncError::InvalidPattern {
                        pattern: pattern.to_owned(),
                        source,
                    })?,
                )
            }
        };
        Ok(Self { regex })
    }

    pub fn matches(&self, folder: &str, title: &str) -> bool {
        match &self.regex {
            None => true,
            Some(regex) => regex.is_match(&join_path(folder, title)),
        }
    }

    /// The source pattern, for logging; empty when matching everything.
    pub fn pattern(&self) -> &str {
        self.regex.as_ref().map(Regex::as_str).unwrap_or("")
    }
}

pub(crate) fn join_path(folder: &str, title: &str) -> String {
    format!("{folder}/{title}")
}
