//! Route table: static lookups plus specificity-ordered patterns.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;

use mycelia_core::error::{MyceliaError, Result};
use mycelia_core::message::Message;
use mycelia_core::path::{Params, RoutePattern};
use mycelia_core::scope::ScopeRule;

use crate::kernel::KernelCtx;

/// Message handlers registered against a route pattern.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: KernelCtx, msg: Message) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(pub u64);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route#{}", self.0)
    }
}

struct RouteEntry {
    id: RouteId,
    pattern: RoutePattern,
    scope: Option<ScopeRule>,
    handler: Arc<dyn MessageHandler>,
}

/// Resolved route for one message.
#[derive(Clone)]
pub struct RouteMatch {
    pub route: RouteId,
    pub pattern: String,
    pub params: Params,
    pub handler: Arc<dyn MessageHandler>,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("route", &self.route)
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Route table:
/// - static paths -> exact hash lookup
/// - patterns -> ordered by specificity, then registration order
pub struct MessageRouter {
    statics: DashMap<String, Arc<RouteEntry>>,
    patterns: RwLock<Vec<Arc<RouteEntry>>>,
    seq: AtomicU64,
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRouter {
    pub fn new() -> Self {
        Self {
            statics: DashMap::new(),
            patterns: RwLock::new(Vec::new()),
            seq: AtomicU64::new(1),
        }
    }

    pub fn register(
        &self,
        pattern: &str,
        handler: Arc<dyn MessageHandler>,
        scope: Option<ScopeRule>,
    ) -> Result<RouteId> {
        let pattern = RoutePattern::compile(pattern)?;
        let id = RouteId(self.seq.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(RouteEntry { id, pattern, scope, handler });

        if entry.pattern.is_static() {
            match self.statics.entry(entry.pattern.as_str().to_string()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(MyceliaError::BadRequest(format!(
                        "route already registered: {}",
                        entry.pattern
                    )));
                }
                dashmap::mapref::entry::Entry::Vacant(v) => {
                    v.insert(entry);
                }
            }
        } else {
            let mut patterns = self.patterns.write().unwrap_or_else(PoisonError::into_inner);
            if patterns.iter().any(|e| e.pattern == entry.pattern) {
                return Err(MyceliaError::BadRequest(format!(
                    "route already registered: {}",
                    entry.pattern
                )));
            }
            patterns.push(entry);
            patterns.sort_by_key(|e| (e.pattern.specificity(), e.id));
        }

        tracing::debug!(route = %id, "route registered");
        Ok(id)
    }

    pub fn unregister(&self, id: RouteId) -> bool {
        let before = self.statics.len();
        self.statics.retain(|_, e| e.id != id);
        if self.statics.len() != before {
            return true;
        }

        let mut patterns = self.patterns.write().unwrap_or_else(PoisonError::into_inner);
        let before = patterns.len();
        patterns.retain(|e| e.id != id);
        patterns.len() != before
    }

    pub fn route_count(&self) -> usize {
        let patterns = self.patterns.read().unwrap_or_else(PoisonError::into_inner).len();
        self.statics.len() + patterns
    }

    /// Resolve the single handler for `msg`, enforcing the route's scope.
    pub fn resolve(&self, msg: &Message) -> Result<RouteMatch> {
        let (entry, params) = self
            .lookup(&msg.path)
            .ok_or_else(|| MyceliaError::NoRoute(msg.path.clone()))?;

        if let Some(rule) = &entry.scope {
            if !rule.permits(&msg.scopes) {
                return Err(MyceliaError::NotAllowed(format!(
                    "scope {rule} required for {}",
                    msg.path
                )));
            }
        }

        Ok(RouteMatch {
            route: entry.id,
            pattern: entry.pattern.as_str().to_string(),
            params,
            handler: Arc::clone(&entry.handler),
        })
    }

    fn lookup(&self, path: &str) -> Option<(Arc<RouteEntry>, Params)> {
        if let Some(e) = self.statics.get(path) {
            return Some((Arc::clone(e.value()), Params::default()));
        }
        let patterns = self.patterns.read().unwrap_or_else(PoisonError::into_inner);
        patterns
            .iter()
            .find_map(|e| e.pattern.matches(path).map(|p| (Arc::clone(e), p)))
    }
}

#[cfg(test)]
mod tests {
    use mycelia_core::message::Payload;

    use super::*;

    struct Noop;

    #[async_trait]
    impl MessageHandler for Noop {
        async fn handle(&self, _ctx: KernelCtx, _msg: Message) -> Result<()> {
            Ok(())
        }
    }

    fn noop() -> Arc<dyn MessageHandler> {
        Arc::new(Noop)
    }

    fn msg(path: &str) -> Message {
        Message::new(path, Payload::Empty).unwrap()
    }

    #[test]
    fn static_beats_pattern() {
        let r = MessageRouter::new();
        let p = r.register("users/{id}", noop(), None).unwrap();
        let s = r.register("users/admin", noop(), None).unwrap();

        assert_eq!(r.resolve(&msg("users/admin")).unwrap().route, s);
        let m = r.resolve(&msg("users/42")).unwrap();
        assert_eq!(m.route, p);
        assert_eq!(m.params.get("id"), Some("42"));
    }

    #[test]
    fn more_specific_pattern_wins_regardless_of_order() {
        let r = MessageRouter::new();
        let rest = r.register("orders/**", noop(), None).unwrap();
        let any = r.register("orders/*/items", noop(), None).unwrap();
        let param = r.register("orders/{id}/items/{item}", noop(), None).unwrap();

        assert_eq!(r.resolve(&msg("orders/1/items/2")).unwrap().route, param);
        assert_eq!(r.resolve(&msg("orders/1/items")).unwrap().route, any);
        assert_eq!(r.resolve(&msg("orders/1/notes")).unwrap().route, rest);
    }

    #[test]
    fn equal_specificity_keeps_registration_order() {
        let r = MessageRouter::new();
        let first = r.register("a/{x}/c", noop(), None).unwrap();
        r.register("a/b/{y}", noop(), None).unwrap();
        assert_eq!(r.resolve(&msg("a/b/c")).unwrap().route, first);
    }

    #[test]
    fn duplicates_are_rejected() {
        let r = MessageRouter::new();
        r.register("x/y", noop(), None).unwrap();
        assert!(r.register("/x/y/", noop(), None).is_err());
        r.register("x/{id}", noop(), None).unwrap();
        assert!(r.register("x/{id}", noop(), None).is_err());
        assert_eq!(r.route_count(), 2);
    }

    #[test]
    fn no_route_and_scope_errors() {
        let r = MessageRouter::new();
        r.register(
            "orders/{id}",
            noop(),
            Some(ScopeRule::parse("orders:write").unwrap()),
        )
        .unwrap();

        let err = r.resolve(&msg("missing")).unwrap_err();
        assert_eq!(err.code().as_str(), "NO_ROUTE");

        let err = r.resolve(&msg("orders/1")).unwrap_err();
        assert_eq!(err.code().as_str(), "NOT_ALLOWED");

        let ok = msg("orders/1").with_scopes(["orders:*"]);
        assert!(r.resolve(&ok).is_ok());
    }

    #[test]
    fn unregister_removes_static_and_pattern_routes() {
        let r = MessageRouter::new();
        let s = r.register("a/b", noop(), None).unwrap();
        let p = r.register("a/{x}", noop(), None).unwrap();

        assert!(r.unregister(s));
        assert_eq!(r.resolve(&msg("a/b")).unwrap().route, p);
        assert!(r.unregister(p));
        assert!(!r.unregister(p));
        assert!(r.resolve(&msg("a/b")).is_err());
    }
}
