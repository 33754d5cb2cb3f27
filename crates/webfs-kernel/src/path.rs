//! Drive path helpers.
//!
//! Drive paths arrive from the driver as `\peer\dir\file`. Peers receive the
//! part after the peer segment joined with `/`. Both separators are accepted
//! everywhere.

/// Split a path into its non-empty components, dropping `.`.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(['\\', '/']).filter(|c| !c.is_empty() && *c != ".")
}

/// Split a drive path into `(peer, remainder)`.
///
/// The remainder is rejoined with `/` and is empty for the peer's own root.
/// Returns `None` for the drive root.
pub fn split_peer(path: &str) -> Option<(&str, String)> {
    let mut parts = components(path);
    let peer = parts.next()?;
    let rest: Vec<&str> = parts.collect();
    Some((peer, rest.join("/")))
}

/// Canonical form used as a map key: components joined by `/`, with `..`
/// resolved. The root is the empty string.
pub fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for c in components(path) {
        if c == ".." {
            out.pop();
        } else {
            out.push(c);
        }
    }
    out.join("/")
}

/// Parent of a normalized path (`""` for top-level entries and the root).
pub fn parent(normalized: &str) -> &str {
    match normalized.rfind('/') {
        Some(i) => &normalized[..i],
        None => "",
    }
}

/// Last component of a normalized path.
pub fn file_name(normalized: &str) -> &str {
    match normalized.rfind('/') {
        Some(i) => &normalized[i + 1..],
        None => normalized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_peer() {
        assert_eq!(
            split_peer(r"\shop.example\sub\file.txt"),
            Some(("shop.example", "sub/file.txt".to_string()))
        );
        assert_eq!(split_peer(r"\shop.example"), Some(("shop.example", String::new())));
        assert_eq!(split_peer(r"\"), None);
        assert_eq!(split_peer(""), None);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(r"\a\.\b\..\c"), "a/c");
        assert_eq!(normalize("a//b/"), "a/b");
        assert_eq!(normalize(r"\..\.."), "");
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent("a/b/c"), "a/b");
        assert_eq!(parent("a"), "");
        assert_eq!(file_name("a/b/c"), "c");
        assert_eq!(file_name("a"), "a");
    }
}
