//! Pattern line parser.

use crate::{BuildDependencyPattern, DependencyPattern, PatternError, PatternLine, PatternType};

/// Parse a single pattern line.
///
/// Backslashes on both sides of the arrow are turned into `/`, so a pattern
/// written on Windows resolves the same way everywhere. Matrix params are
/// kept verbatim; encoding happens when a request URL is built.
///
/// # Errors
/// Returns `PatternError::Malformed` when the line has no `=>`/`=!>` arrow
/// or more than one, when the `repo:` prefix is missing, or when `@` is not
/// followed by `buildName#buildNumber`.
pub fn parse(line: &str) -> Result<PatternLine, PatternError> {
    let (source, target, pattern_type) = split_arrow(line)?;
    let source = separators_to_unix(source.trim());
    let target_directory = separators_to_unix(target.trim());

    let (head, build) = match source.rsplit_once('@') {
        Some((head, build)) => (head, Some(build)),
        None => (source.as_str(), None),
    };
    let (pattern, matrix_params) = split_matrix(head);

    let Some((repo, _)) = pattern.split_once(':') else {
        return Err(malformed(line, "missing `:` between repository and path"));
    };
    if repo.trim().is_empty() {
        return Err(malformed(line, "repository name is empty"));
    }

    let dependency = DependencyPattern {
        pattern,
        matrix_params,
        target_directory,
        pattern_type,
    };
    let Some(build) = build else {
        return Ok(PatternLine::Plain(dependency));
    };

    let Some((build_name, build_number)) = build.rsplit_once('#') else {
        return Err(malformed(line, "`@` must be followed by `buildName#buildNumber`"));
    };
    if build_number.trim().is_empty() {
        return Err(malformed(line, "build number after `#` is empty"));
    }

    Ok(PatternLine::Build(BuildDependencyPattern {
        dependency,
        build_name: build_name.to_owned(),
        build_number: build_number.to_owned(),
    }))
}

/// Split at the first arrow, rejecting a second one.
fn split_arrow(line: &str) -> Result<(&str, &str, PatternType), PatternError> {
    let normal = line.find(PatternType::Normal.arrow());
    let delete = line.find(PatternType::Delete.arrow());

    let (index, pattern_type) = match (normal, delete) {
        (Some(n), Some(d)) if d < n => (d, PatternType::Delete),
        (Some(n), _) => (n, PatternType::Normal),
        (None, Some(d)) => (d, PatternType::Delete),
        (None, None) => return Err(malformed(line, "missing `=>` or `=!>`")),
    };

    let source = line.get(..index).unwrap_or_default();
    let target = line
        .get(index + pattern_type.arrow().len()..)
        .unwrap_or_default();

    if target.contains(PatternType::Normal.arrow()) || target.contains(PatternType::Delete.arrow())
    {
        return Err(malformed(line, "more than one `=>` or `=!>`"));
    }

    Ok((source, target, pattern_type))
}

/// `"repo:a/*;x=1;y=2"` -> `("repo:a/*", "x=1;y=2")`.
fn split_matrix(source: &str) -> (String, String) {
    match source.split_once(';') {
        Some((pattern, matrix)) => (pattern.to_owned(), matrix.to_owned()),
        None => (source.to_owned(), String::new()),
    }
}

fn separators_to_unix(path: &str) -> String {
    path.replace('\\', "/")
}

fn malformed(line: &str, reason: &str) -> PatternError {
    PatternError::Malformed {
        line: line.to_owned(),
        reason: reason.to_owned(),
    }
}
