//! Association paths are cross references between resources. When a subtree
//! is dumped, each reference is stored relative to the resource that holds
//! it, so the dump can be restored under a different root.
//!
//! The relative form climbs with `..` from the **collection** of the
//! reference resource. Climbing is bounded at the root. A climb that would
//! go past the root is written out as empty segments, so an escaped target
//! such as `//x` survives the trip.
//!
//! The two functions are close to inverse but not exactly: targets with
//! literal empty segments are normalized through `/../`, which is resolved
//! on a best-effort basis.

use super::ROOT;

const PARENT: &str = "..";

/// Splits on `/`, dropping trailing empty segments (`/a/b/` → `["", "a", "b"]`).
fn segments(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('/').collect();
    while parts.last().is_some_and(|s| s.is_empty()) {
        parts.pop();
    }
    parts
}

/// Resolves `relative_path` (possibly `..`-prefixed) against the resource at `reference_path`.
pub fn resolve_association_path(relative_path: &str, reference_path: &str) -> String {
    let reference = segments(reference_path);
    let relative = segments(relative_path);

    // First element is the empty root segment, last is the reference's own name.
    let bound = reference.len().saturating_sub(2);
    let climbed = relative
        .iter()
        .take(bound)
        .take_while(|s| **s == PARENT)
        .count();

    let keep = reference.len().saturating_sub(climbed + 1).max(1);
    let mut out: Vec<&str> = reference.iter().take(keep).copied().collect();
    if out.is_empty() {
        out.push("");
    }

    let mut escaping = true;
    for segment in &relative[climbed..] {
        if escaping && *segment == PARENT {
            out.push("");
        } else {
            escaping = false;
            out.push(segment);
        }
    }

    let resolved = out.join("/");
    if resolved.is_empty() {
        ROOT.to_string()
    } else {
        resolved
    }
}

/// Expresses `absolute_path` relative to the resource at `reference_path`.
pub fn relativize_association_path(absolute_path: &str, reference_path: &str) -> String {
    let reference = segments(reference_path);
    let target = segments(absolute_path);
    if target.is_empty() {
        return absolute_path.to_string();
    }

    let mut common = 0;
    while common + 1 < reference.len()
        && common + 1 < target.len()
        && reference[common] == target[common]
    {
        common += 1;
    }

    let mut relative = String::new();
    for _ in common..reference.len().saturating_sub(1) {
        relative.push_str("../");
    }
    for segment in &target[common..target.len() - 1] {
        relative.push_str(segment);
        relative.push('/');
    }
    relative.push_str(target[target.len() - 1]);

    relative.replace("//", "/../")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_sibling() {
        assert_eq!(resolve_association_path("d", "/a/b/c"), "/a/b/d");
    }

    #[test]
    fn test_resolve_climbs() {
        assert_eq!(resolve_association_path("../x", "/a/b/c"), "/a/x");
        assert_eq!(resolve_association_path("../../x", "/a/b/c"), "/x");
    }

    #[test]
    fn test_resolve_climb_is_bounded_at_root() {
        // Only two levels are available above /a/b/c; the third `..` escapes.
        assert_eq!(resolve_association_path("../../../x", "/a/b/c"), "//x");
        assert_eq!(resolve_association_path("../..", "/a/b/c"), "/");
    }

    #[test]
    fn test_resolve_top_level_reference() {
        assert_eq!(resolve_association_path("x", "/c"), "/x");
        assert_eq!(resolve_association_path("x/y", "/c"), "/x/y");
    }

    #[test]
    fn test_relativize() {
        assert_eq!(relativize_association_path("/a/b/d", "/a/b/c"), "d");
        assert_eq!(relativize_association_path("/a/x/y", "/a/b/c"), "../x/y");
        assert_eq!(relativize_association_path("/a", "/a/b/c"), "../../a");
        assert_eq!(relativize_association_path("/a/b/c/d", "/a/b/c"), "c/d");
    }

    #[test]
    fn test_relativize_collapses_empty_segments() {
        assert_eq!(relativize_association_path("//x", "/a/b/c"), "../../../x");
    }

    #[test]
    fn test_round_trip_within_climb_bound() {
        let cases = [
            ("/a/b/d", "/a/b/c"),
            ("/a/x/y", "/a/b/c"),
            ("/a/b/c", "/a/b/c"),
            ("/a/b/c/d/e", "/a/b/c"),
            ("/a/z", "/a/b"),
            ("/x", "/c"),
        ];
        for (target, reference) in cases {
            let rel = relativize_association_path(target, reference);
            assert_eq!(
                resolve_association_path(&rel, reference),
                target,
                "{} via {}",
                rel,
                reference
            );
        }
    }

    #[test]
    fn test_round_trip_at_climb_bound() {
        let cases = [
            ("/x", "/a/b/c"),
            ("/a", "/a/b/c"),
            ("//x", "/a/b/c"),
            ("//x", "/c"),
        ];
        for (target, reference) in cases {
            let rel = relativize_association_path(target, reference);
            assert_eq!(
                resolve_association_path(&rel, reference),
                target,
                "{} via {}",
                rel,
                reference
            );
        }
    }
}
