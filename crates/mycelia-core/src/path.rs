//! Message paths and route patterns.
//!
//! Paths are slash-separated segments (`orders/42/created`). Patterns use the
//! same shape with three extra segment kinds:
//! - `{name}` captures exactly one segment under `name`.
//! - `*` matches exactly one segment without capturing it.
//! - `**` (final segment only) matches one or more remaining segments.
//!
//! Matching never allocates for static patterns beyond the split iterator and
//! never indexes raw slices, so hostile paths cannot panic the router.

use std::cmp::Reverse;
use std::fmt;

use crate::error::{MyceliaError, Result};

/// Normalize a message path: strip surrounding `/`, reject empty paths,
/// empty segments, and whitespace inside segments.
pub fn normalize(path: &str) -> Result<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(MyceliaError::BadRequest("path must not be empty".into()));
    }
    for seg in trimmed.split('/') {
        if seg.is_empty() {
            return Err(MyceliaError::BadRequest(format!("empty segment in path: {path}")));
        }
        if seg.chars().any(char::is_whitespace) {
            return Err(MyceliaError::BadRequest(format!("whitespace in path segment: {seg}")));
        }
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Any,
    Rest,
}

/// Parameters captured by a pattern match, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

/// Sort key for pattern precedence. Smaller sorts first (more specific).
pub type Specificity = (bool, Reverse<usize>, usize);

impl RoutePattern {
    pub fn compile(raw: &str) -> Result<Self> {
        let normalized = normalize(raw)?;
        let parts: Vec<&str> = normalized.split('/').collect();
        let last = parts.len().saturating_sub(1);

        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<&str> = Vec::new();

        for (i, part) in parts.iter().enumerate() {
            let seg = match *part {
                "**" => {
                    if i != last {
                        return Err(MyceliaError::BadRequest(format!(
                            "`**` must be the final segment: {raw}"
                        )));
                    }
                    Segment::Rest
                }
                "*" => Segment::Any,
                p if p.starts_with('{') && p.ends_with('}') => {
                    let name = p.get(1..p.len() - 1).unwrap_or_default();
                    if name.is_empty() {
                        return Err(MyceliaError::BadRequest(format!(
                            "empty parameter name in pattern: {raw}"
                        )));
                    }
                    if names.contains(&name) {
                        return Err(MyceliaError::BadRequest(format!(
                            "duplicate parameter `{name}` in pattern: {raw}"
                        )));
                    }
                    names.push(name);
                    Segment::Param(name.to_string())
                }
                p if p.contains('{') || p.contains('}') => {
                    return Err(MyceliaError::BadRequest(format!(
                        "malformed parameter segment `{p}` in pattern: {raw}"
                    )));
                }
                p => Segment::Literal(p.to_string()),
            };
            segments.push(seg);
        }

        Ok(Self { raw: normalized, segments })
    }

    /// Normalized pattern text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_static(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    pub fn specificity(&self) -> Specificity {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count();
        let wild = self
            .segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_) | Segment::Any))
            .count();
        let rest = matches!(self.segments.last(), Some(Segment::Rest));
        (rest, Reverse(literals), wild)
    }

    /// Match a normalized path, returning captured parameters.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut parts = path.split('/');
        let mut params = Vec::new();

        for seg in &self.segments {
            match seg {
                Segment::Rest => {
                    // one or more remaining segments
                    return parts.next().map(|_| Params(params));
                }
                Segment::Literal(lit) => {
                    if parts.next()? != lit {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let v = parts.next()?;
                    params.push((name.clone(), v.to_string()));
                }
                Segment::Any => {
                    parts.next()?;
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(Params(params))
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
