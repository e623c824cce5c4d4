//! Routing scopes (`namespace:action`).
//!
//! A route may require a scope; a message carries the scopes granted to its
//! sender. `ns:*` is a wildcard on either side.

use std::fmt;

use crate::error::{MyceliaError, Result};

/// Compiled scope requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRule {
    pub namespace: String,
    pub action: Option<String>, // None => wildcard
}

impl ScopeRule {
    pub fn parse(raw: &str) -> Result<Self> {
        // format: "ns:action" or "ns:*"
        let (ns, action) = raw.split_once(':').ok_or_else(|| {
            MyceliaError::BadRequest(format!("invalid scope: {raw} (expected ns:action)"))
        })?;
        if ns.is_empty() || action.is_empty() {
            return Err(MyceliaError::BadRequest(format!(
                "invalid scope: {raw} (empty namespace or action)"
            )));
        }
        let action = if action == "*" { None } else { Some(action.to_string()) };
        Ok(Self { namespace: ns.to_string(), action })
    }

    /// True when any granted scope satisfies this rule.
    pub fn permits(&self, granted: &[String]) -> bool {
        granted.iter().any(|g| {
            let Some((ns, action)) = g.split_once(':') else { return false; };
            if ns != self.namespace {
                return false;
            }
            match &self.action {
                None => true,
                Some(a) => action == "*" || action == a,
            }
        })
    }
}

impl fmt::Display for ScopeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Some(a) => write!(f, "{}:{}", self.namespace, a),
            None => write!(f, "{}:*", self.namespace),
        }
    }
}
