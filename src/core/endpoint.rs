//! Joining endpoint paths onto the configured base URL.

/// Normalizes `endpoint` so that `base_url + result` has exactly one `/` at the join.
///
/// Leading slashes are stripped from the endpoint; a single one is put back only when
/// the base URL does not already end with `/`.
#[must_use]
pub fn normalize(endpoint: &str, base_url: &str) -> String {
    let stripped = endpoint.trim_start_matches('/');
    if base_url.ends_with('/') {
        stripped.to_string()
    } else {
        format!("/{stripped}")
    }
}

/// Concatenates `base_url` and the normalized `endpoint`.
#[must_use]
pub fn join(base_url: &str, endpoint: &str) -> String {
    let mut out = String::with_capacity(base_url.len() + endpoint.len() + 1);
    out.push_str(base_url);
    out.push_str(&normalize(endpoint, base_url));
    out
}
