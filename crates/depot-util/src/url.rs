//! Deployment URL construction: path escaping and matrix params.

use std::collections::BTreeMap;

use ::url::form_urlencoded::byte_serialize;

/// Escape each `/`-separated segment of a repository path.
///
/// Spaces become `%20` (not `+`). A `;key=value` suffix is treated as
/// already-encoded matrix params and kept as is. Empty segments are dropped.
pub fn encode_path(unescaped: &str) -> String {
    let (path, matrix) = match unescaped.split_once(';') {
        Some((path, matrix)) => (path, Some(matrix)),
        None => (unescaped, None),
    };

    let escaped = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| form_encode(segment).replace('+', "%20"))
        .collect::<Vec<_>>()
        .join("/");

    match matrix {
        Some(matrix) if !matrix.trim().is_empty() => format!("{escaped};{matrix}"),
        _ => escaped,
    }
}

/// Render properties as `;key=value` matrix params, `/` left unescaped.
pub fn matrix_params(properties: &BTreeMap<String, String>) -> String {
    properties
        .iter()
        .map(|(key, value)| format!(";{}={}", encode_param(key), encode_param(value)))
        .collect()
}

/// `{base}/{repository}/{artifact_path};{matrix params}`.
pub fn deployment_url(
    base_url: &str,
    repository: &str,
    artifact_path: &str,
    properties: Option<&BTreeMap<String, String>>,
) -> String {
    let mut url = format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        encode_path(repository),
        encode_path(artifact_path)
    );
    if let Some(properties) = properties {
        url.push_str(&matrix_params(properties));
    }
    url
}

fn form_encode(s: &str) -> String {
    byte_serialize(s.as_bytes()).collect()
}

fn encode_param(s: &str) -> String {
    form_encode(s).replace("%2F", "/")
}
