//! # Path Addressing
//!
//! Every node in the registry is addressed by an absolute, `/`-rooted path.
//! A path may carry **parameters** after the base path, separated by `;`,
//! each either a bare `name` or a `name:value` pair:
//!
//! ```text
//! /projects/alpha/spec.txt;version:4
//! /projects/alpha/spec.txt;comments:12
//! /projects/alpha/spec.txt;ratings:alice
//! /projects/alpha;start:0;pageLen:25      (paged child listing)
//! ```
//!
//! ## Parsing Rules
//!
//! [`PathAddress::parse`] never fails. The parameter section is the longest
//! run of trailing `;` segments that are all well-formed parameters; anything
//! before it, including `;` segments that do not look like parameters, is
//! the base path. So `/a;b/c;version:2` has base path `/a;b/c` and version 2.
//!
//! Parameters are kept in a sorted map. Serializing a parsed address gives a
//! path that addresses the same node with the same parameter set, but the
//! parameter order may differ from the input.
//!
//! ## Path Arithmetic
//!
//! - [`parent`] / [`name`]: hierarchical navigation, root-aware.
//! - [`chroot`]: translation between absolute and origin-relative paths.
//! - [`association`]: `..`-relative cross references used by dump/restore.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

pub mod association;
pub mod chroot;

pub use association::{relativize_association_path, resolve_association_path};
pub use chroot::{to_absolute, to_relative};

pub const ROOT: &str = "/";
pub const SEPARATOR: char = '/';
pub const PARAM_SEPARATOR: char = ';';

pub const VERSION_PARAM: &str = "version";
pub const COMMENTS_PARAM: &str = "comments";
pub const RATINGS_PARAM: &str = "ratings";
pub const START_PARAM: &str = "start";
pub const PAGE_LEN_PARAM: &str = "pageLen";

/// A parsed registry path: base path plus optional parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PathAddress {
    path: String,
    parameters: BTreeMap<String, Option<String>>,
}

impl PathAddress {
    /// Parses a raw path. Malformed parameter syntax is folded into the base path.
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = raw.split(PARAM_SEPARATOR).collect();

        // Longest suffix of well-formed parameter segments.
        let mut first_param = parts.len();
        while first_param > 1 && parse_parameter(parts[first_param - 1]).is_some() {
            first_param -= 1;
        }

        let mut parameters = BTreeMap::new();
        for part in &parts[first_param..] {
            if let Some((name, value)) = parse_parameter(part) {
                parameters.insert(name.to_string(), value.map(str::to_string));
            }
        }

        Self {
            path: absolute(&parts[..first_param].join(";")),
            parameters,
        }
    }

    /// An address with no parameters.
    pub fn new(path: &str) -> Self {
        Self {
            path: absolute(path),
            parameters: BTreeMap::new(),
        }
    }

    /// The base path, without parameters.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parameters(&self) -> &BTreeMap<String, Option<String>> {
        &self.parameters
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Value of a `name:value` parameter. Bare parameters yield `None`.
    pub fn parameter_value(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(|v| v.as_deref())
    }

    pub fn with_parameter(mut self, name: &str, value: Option<&str>) -> Self {
        self.set_parameter(name, value);
        self
    }

    pub fn set_parameter(&mut self, name: &str, value: Option<&str>) {
        self.parameters
            .insert(name.to_string(), value.map(str::to_string));
    }

    pub fn remove_parameter(&mut self, name: &str) -> Option<Option<String>> {
        self.parameters.remove(name)
    }

    /// Version number requested through `;version:N`, or -1 when absent or not numeric.
    pub fn version(&self) -> i64 {
        self.parameter_value(VERSION_PARAM)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(-1)
    }

    pub fn is_versioned(&self) -> bool {
        self.version() >= 0
    }

    /// True when the address carries no parameters at all.
    pub fn is_plain(&self) -> bool {
        self.parameters.is_empty()
    }

    /// The same base path with every parameter dropped.
    pub fn without_parameters(&self) -> PathAddress {
        PathAddress::new(&self.path)
    }

    pub fn parent(&self) -> Option<String> {
        parent(&self.path)
    }

    pub fn name(&self) -> &str {
        name(&self.path)
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        for (name, value) in &self.parameters {
            match value {
                Some(v) => write!(f, ";{}:{}", name, v)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

impl FromStr for PathAddress {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PathAddress::parse(s))
    }
}

impl From<&str> for PathAddress {
    fn from(s: &str) -> Self {
        PathAddress::parse(s)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Parses `name` or `name:value`. `None` when the segment is not a parameter.
fn parse_parameter(segment: &str) -> Option<(&str, Option<&str>)> {
    let (name, value) = match segment.split_once(':') {
        Some((n, v)) => (n, Some(v)),
        None => (segment, None),
    };
    if name.is_empty() || !name.chars().all(is_name_char) {
        return None;
    }
    if let Some(v) = value {
        if v.contains(SEPARATOR) {
            return None;
        }
    }
    Some((name, value))
}

fn absolute(path: &str) -> String {
    if path.starts_with(SEPARATOR) {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Parent of `path`, or `None` for the root.
///
/// One trailing separator is ignored, so `/a/b/` has parent `/a`.
pub fn parent(path: &str) -> Option<String> {
    if path.is_empty() || path == ROOT {
        return None;
    }
    let trimmed = path.strip_suffix(SEPARATOR).unwrap_or(path);
    match trimmed.rfind(SEPARATOR) {
        None | Some(0) => Some(ROOT.to_string()),
        Some(idx) => Some(trimmed[..idx].to_string()),
    }
}

/// Final non-empty segment of `path`. The root is its own name.
pub fn name(path: &str) -> &str {
    if path == ROOT {
        return ROOT;
    }
    let trimmed = path.strip_suffix(SEPARATOR).unwrap_or(path);
    match trimmed.rfind(SEPARATOR) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Joins a collection path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    let child = child.trim_start_matches(SEPARATOR);
    if parent == ROOT || parent.is_empty() {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent.trim_end_matches(SEPARATOR), child)
    }
}

/// Collapses repeated separators and drops a trailing one.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
        out.push(SEPARATOR);
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push(SEPARATOR);
    }
    out
}

/// True if `path` is `ancestor` itself or lies somewhere beneath it.
///
/// Matching is segment-aware: `/ab` is not beneath `/a`.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return path.starts_with(SEPARATOR);
    }
    let ancestor = ancestor.strip_suffix(SEPARATOR).unwrap_or(ancestor);
    match path.strip_prefix(ancestor) {
        Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_path() {
        let addr = PathAddress::parse("/a/b");
        assert_eq!(addr.path(), "/a/b");
        assert!(addr.is_plain());
        assert_eq!(addr.version(), -1);
    }

    #[test]
    fn test_parse_version_parameter() {
        let addr = PathAddress::parse("/a/b;version:7");
        assert_eq!(addr.path(), "/a/b");
        assert_eq!(addr.version(), 7);
        assert!(addr.is_versioned());
    }

    #[test]
    fn test_parse_bare_and_valued_parameters() {
        let addr = PathAddress::parse("/a;comments:3;flag");
        assert_eq!(addr.path(), "/a");
        assert_eq!(addr.parameter_value("comments"), Some("3"));
        assert!(addr.has_parameter("flag"));
        assert_eq!(addr.parameter_value("flag"), None);
    }

    #[test]
    fn test_malformed_parameters_stay_in_base_path() {
        let addr = PathAddress::parse("/a;b/c;version:2");
        assert_eq!(addr.path(), "/a;b/c");
        assert_eq!(addr.version(), 2);

        let addr = PathAddress::parse("/a;;x");
        assert_eq!(addr.path(), "/a;");
        assert!(addr.has_parameter("x"));

        let addr = PathAddress::parse("/a;x y");
        assert_eq!(addr.path(), "/a;x y");
        assert!(addr.is_plain());
    }

    #[test]
    fn test_non_numeric_version_is_absent() {
        assert_eq!(PathAddress::parse("/a;version:latest").version(), -1);
    }

    #[test]
    fn test_relative_input_becomes_absolute() {
        assert_eq!(PathAddress::parse("a/b").path(), "/a/b");
        assert_eq!(PathAddress::parse("").path(), "/");
    }

    #[test]
    fn test_reserialization_keeps_parameter_set() {
        let raw = "/x/y;version:2;comments:5";
        let addr = PathAddress::parse(raw);
        let again = PathAddress::parse(&addr.to_string());
        assert_eq!(addr, again);
        assert_eq!(again.parameters().len(), 2);
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/".to_string()));
        assert_eq!(parent("/a/b"), Some("/a".to_string()));
        assert_eq!(parent("/a/b/"), Some("/a".to_string()));
    }

    #[test]
    fn test_name() {
        assert_eq!(name("/"), "/");
        assert_eq!(name("/a"), "a");
        assert_eq!(name("/a/b/"), "b");
    }

    #[test]
    fn test_parent_and_name_rebuild_path() {
        for p in ["/a", "/a/b", "/a/b/c", "/a/b/c/", "/long name/x y"] {
            let rebuilt = format!("{}/{}", parent(p).unwrap(), name(p));
            assert_eq!(normalize(&rebuilt), normalize(p), "path {}", p);
        }
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(join("/a/", "/b"), "/a/b");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a", "/a"));
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a/b", "/"));
        assert!(!is_within("/ab", "/a"));
        assert!(!is_within("/a", "/a/b"));
    }
}
