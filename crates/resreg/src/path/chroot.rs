//! Translation between absolute registry paths and paths relative to an
//! origin (a chroot or mount prefix).
//!
//! A path that lies outside the origin cannot be expressed relative to it.
//! Such paths are **escaped** by prefixing an extra separator (`//x`), so a
//! caller can tell them apart and the translation stays reversible.
//! Inputs that do not start with `/` are not paths and pass through untouched.

use super::{ROOT, SEPARATOR};

fn is_identity_origin(origin: &str) -> bool {
    origin.is_empty() || origin == ROOT
}

/// Expresses `absolute` relative to `origin`.
pub fn to_relative(absolute: &str, origin: &str) -> String {
    if !absolute.starts_with(SEPARATOR) || is_identity_origin(origin) {
        return absolute.to_string();
    }
    let origin = origin.strip_suffix(SEPARATOR).unwrap_or(origin);
    if absolute == origin {
        return ROOT.to_string();
    }
    match absolute.strip_prefix(origin) {
        Some(rest) if rest.starts_with(SEPARATOR) => rest.to_string(),
        _ => format!("/{}", absolute),
    }
}

/// Expands a path relative to `origin` into an absolute one.
pub fn to_absolute(relative: &str, origin: &str) -> String {
    if !relative.starts_with(SEPARATOR) || is_identity_origin(origin) {
        return relative.to_string();
    }
    if relative.starts_with("//") {
        return relative[1..].to_string();
    }
    let origin = origin.strip_suffix(SEPARATOR).unwrap_or(origin);
    if relative == ROOT {
        return origin.to_string();
    }
    format!("{}{}", origin, relative)
}
