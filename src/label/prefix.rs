//! Turning path prefixes and custom prefixes into label segments.

/// Convert a slash delimited scope prefix (`/foo/bar`) into a dotted label
/// segment (`foo.bar`).
///
/// Empty path segments are dropped, so `/api/` and `/a//b` never produce
/// empty label segments. `None` and `Some("")` pass through untouched so
/// that callers can tell a missing prefix apart from an empty one.
pub fn normalize_framework_prefix(prefix: Option<&str>) -> Option<String> {
    match prefix {
        Some(prefix) if !prefix.is_empty() => Some(
            prefix
                .split('/')
                .filter(|segment| !segment.is_empty())
                .collect::<Vec<_>>()
                .join("."),
        ),
        other => other.map(str::to_owned),
    }
}

/// Join a parent scope path and a nested scope path without doubling or
/// leaving trailing slashes.
pub fn join_scope_prefix(parent: &str, prefix: &str) -> String {
    format!(
        "{}{}",
        parent.trim_end_matches('/'),
        prefix.trim_end_matches('/')
    )
}

/// Trim surrounding whitespace from a routes prefix.
pub fn normalize_routes_prefix(prefix: &str) -> String {
    prefix.trim().to_owned()
}

/// Strip leading and trailing dots from a configured routes prefix, keeping
/// the inner ones: `.foo.bar.` becomes `foo.bar`.
pub fn strip_prefix_dots(prefix: &str) -> &str {
    prefix.trim_start_matches('.').trim_end_matches('.')
}
