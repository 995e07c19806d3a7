#![forbid(unsafe_code)]
//! Dependency pattern lines for Depot.
//!
//! A pattern line selects artifacts in a remote repository and names the
//! local directory they land in:
//!
//! ```text
//! repo:path/glob;key=value;key+=value@buildName#buildNumber=>target/dir
//! ```
//!
//! `=>` downloads the matches, `=!>` deletes them. The matrix params and the
//! `@build#number` suffix are optional.

mod parse;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

pub use parse::parse;

/// What to do with the artifacts a pattern selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternType {
    /// `=>`
    Normal,
    /// `=!>`
    Delete,
}

impl PatternType {
    /// The arrow that separates source from target for this type.
    pub fn arrow(self) -> &'static str {
        match self {
            Self::Normal => "=>",
            Self::Delete => "=!>",
        }
    }
}

/// A parsed pattern without a build constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyPattern {
    /// Repository-qualified path glob, e.g. `"libs:org/**/*.jar"`.
    pub pattern: String,
    /// Raw matrix params following the first `;`, or `""`.
    pub matrix_params: String,
    /// Local target directory with `/` separators, or `""`.
    pub target_directory: String,
    pub pattern_type: PatternType,
}

impl DependencyPattern {
    fn write_source(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)?;
        if !self.matrix_params.is_empty() {
            write!(f, ";{}", self.matrix_params)?;
        }
        Ok(())
    }

    fn write_target(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pattern_type.arrow(), self.target_directory)
    }
}

impl fmt::Display for DependencyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_source(f)?;
        self.write_target(f)
    }
}

/// A pattern restricted to the artifacts of one published build.
///
/// Two build patterns are equal when they name the same build, whatever
/// their path glob, matrix params or target. Downloads are grouped per build,
/// so a set of these holds one entry per build.
#[derive(Debug, Clone)]
pub struct BuildDependencyPattern {
    pub dependency: DependencyPattern,
    pub build_name: String,
    pub build_number: String,
}

impl PartialEq for BuildDependencyPattern {
    fn eq(&self, other: &Self) -> bool {
        self.build_name == other.build_name && self.build_number == other.build_number
    }
}

impl Eq for BuildDependencyPattern {}

impl Hash for BuildDependencyPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.build_name.hash(state);
        self.build_number.hash(state);
    }
}

impl fmt::Display for BuildDependencyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dependency.write_source(f)?;
        write!(f, "@{}#{}", self.build_name, self.build_number)?;
        self.dependency.write_target(f)
    }
}

/// One parsed pattern line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternLine {
    Plain(DependencyPattern),
    Build(BuildDependencyPattern),
}

impl PatternLine {
    /// The fields shared by both kinds of pattern.
    pub fn dependency(&self) -> &DependencyPattern {
        match self {
            Self::Plain(dependency) => dependency,
            Self::Build(build) => &build.dependency,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.dependency().pattern
    }

    pub fn matrix_params(&self) -> &str {
        &self.dependency().matrix_params
    }

    pub fn target_directory(&self) -> &str {
        &self.dependency().target_directory
    }

    pub fn pattern_type(&self) -> PatternType {
        self.dependency().pattern_type
    }

    /// `(build_name, build_number)` for build patterns.
    pub fn build(&self) -> Option<(&str, &str)> {
        match self {
            Self::Plain(_) => None,
            Self::Build(build) => Some((&build.build_name, &build.build_number)),
        }
    }
}

impl fmt::Display for PatternLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(dependency) => fmt::Display::fmt(dependency, f),
            Self::Build(build) => fmt::Display::fmt(build, f),
        }
    }
}

impl FromStr for PatternLine {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("malformed pattern \"{line}\": {reason}")]
    Malformed { line: String, reason: String },
}
