//! Include/exclude path patterns for deployable artifacts.

use glob::{MatchOptions, Pattern};

use crate::error::UtilError;

// `*` crosses `/`, matching how build servers have always filtered deploy paths.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Include and exclude patterns applied to artifact deploy paths.
#[derive(Debug, Clone, Default)]
pub struct IncludeExcludePatterns {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl IncludeExcludePatterns {
    /// Build from comma- or whitespace-separated pattern lists.
    ///
    /// # Errors
    /// Returns `UtilError::PathPattern` if any pattern is not a valid glob.
    pub fn new(include: &str, exclude: &str) -> Result<Self, UtilError> {
        Ok(Self {
            include: compile_all(split_patterns(include))?,
            exclude: compile_all(split_patterns(exclude))?,
        })
    }

    /// Build from already separated pattern lists.
    ///
    /// # Errors
    /// Returns `UtilError::PathPattern` if any pattern is not a valid glob.
    pub fn from_lists(include: &[String], exclude: &[String]) -> Result<Self, UtilError> {
        Ok(Self {
            include: compile_all(include.iter().map(String::as_str))?,
            exclude: compile_all(exclude.iter().map(String::as_str))?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// True when there are no include patterns or one of them matches.
    pub fn is_included(&self, path: &str) -> bool {
        self.include.is_empty() || matches_any(&self.include, path)
    }

    /// True when one of the exclude patterns matches.
    pub fn is_excluded(&self, path: &str) -> bool {
        matches_any(&self.exclude, path)
    }

    /// A path conflicts when it is not included or is excluded.
    pub fn conflicts(&self, path: &str) -> bool {
        !self.is_included(path) || self.is_excluded(path)
    }
}

fn split_patterns(patterns: &str) -> impl Iterator<Item = &str> {
    patterns
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
}

fn compile_all<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<Vec<Pattern>, UtilError> {
    patterns
        .filter(|p| !p.trim().is_empty())
        .map(|p| {
            Pattern::new(p).map_err(|e| UtilError::PathPattern {
                pattern: p.to_owned(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn matches_any(patterns: &[Pattern], path: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| pattern.matches_with(path, MATCH_OPTIONS))
}
