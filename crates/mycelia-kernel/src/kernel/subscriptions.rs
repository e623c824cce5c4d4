//! Subscriber registry: patterns, per-subscriber inboxes, and path matching.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use mycelia_core::error::Result;
use mycelia_core::path::RoutePattern;

use crate::queue::MessageQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

struct Subscription {
    subscriber: String,
    pattern: RoutePattern,
}

/// Subscription registry:
/// - `sub_id -> (subscriber, pattern)`
/// - `static path -> {sub_id...}` for exact patterns
/// - `subscriber -> {sub_id...}` and `subscriber -> inbox`
///
/// Each subscriber owns one inbox shared by all of its patterns, so a message
/// matching several patterns is delivered once.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subs: DashMap<SubscriptionId, Subscription>,
    static_index: DashMap<String, DashSet<SubscriptionId>>,
    wildcard: DashSet<SubscriptionId>,
    by_subscriber: DashMap<String, DashSet<SubscriptionId>>,
    inboxes: DashMap<String, Arc<MessageQueue>>,
    seq: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(1),
            ..Default::default()
        }
    }

    /// Subscribe `subscriber` to `pattern`. The subscriber's inbox is created
    /// with `make_inbox` on its first subscription and reused afterwards.
    ///
    /// All mutations for one subscriber run under its `by_subscriber` entry
    /// guard, so a concurrent `unsubscribe` of its last subscription cannot
    /// close the inbox this call hands out.
    /// Lock order: `by_subscriber` -> `inboxes` | `subs` | indexes.
    pub fn subscribe(
        &self,
        subscriber: &str,
        pattern: &str,
        make_inbox: impl FnOnce() -> MessageQueue,
    ) -> Result<(SubscriptionId, Arc<MessageQueue>)> {
        let pattern = RoutePattern::compile(pattern)?;
        let id = SubscriptionId(self.seq.fetch_add(1, Ordering::Relaxed));

        let ids = self
            .by_subscriber
            .entry(subscriber.to_string())
            .or_insert_with(DashSet::new);
        ids.insert(id);

        let inbox = self
            .inboxes
            .entry(subscriber.to_string())
            .or_insert_with(|| Arc::new(make_inbox()))
            .value()
            .clone();

        let is_static = pattern.is_static();
        let key = pattern.as_str().to_string();
        self.subs.insert(
            id,
            Subscription {
                subscriber: subscriber.to_string(),
                pattern,
            },
        );
        if is_static {
            self.static_index
                .entry(key)
                .or_insert_with(DashSet::new)
                .insert(id);
        } else {
            self.wildcard.insert(id);
        }
        drop(ids);

        Ok((id, inbox))
    }

    /// Remove one subscription. When it was the subscriber's last, the inbox
    /// is closed and dropped from the registry.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some(subscriber) = self.subs.get(&id).map(|s| s.subscriber.clone()) else {
            return false;
        };
        let Entry::Occupied(ids) = self.by_subscriber.entry(subscriber) else {
            return false;
        };
        // another unsubscribe of the same id may have won the guard first
        let Some((_, sub)) = self.subs.remove(&id) else { return false; };

        if sub.pattern.is_static() {
            let key = sub.pattern.as_str();
            if let Some(set) = self.static_index.get(key) {
                set.remove(&id);
            }
            self.static_index.remove_if(key, |_, set| set.is_empty());
        } else {
            self.wildcard.remove(&id);
        }

        ids.get().remove(&id);
        if ids.get().is_empty() {
            // inbox goes before the entry so the guard covers both
            if let Some((_, inbox)) = self.inboxes.remove(&sub.subscriber) {
                inbox.close();
            }
            ids.remove();
        }
        true
    }

    /// Drop every subscription of `subscriber`. Returns how many were removed.
    pub fn remove_subscriber(&self, subscriber: &str) -> usize {
        let ids: Vec<SubscriptionId> = self
            .by_subscriber
            .get(subscriber)
            .map(|set| set.iter().map(|r| *r.key()).collect())
            .unwrap_or_default();
        ids.into_iter().filter(|id| self.unsubscribe(*id)).count()
    }

    /// Inboxes whose subscriptions match `path`, at most once per subscriber.
    pub fn matching(&self, path: &str) -> Vec<(String, Arc<MessageQueue>)> {
        let mut names: HashSet<String> = HashSet::new();

        if let Some(set) = self.static_index.get(path) {
            for id in set.iter() {
                if let Some(sub) = self.subs.get(id.key()) {
                    names.insert(sub.subscriber.clone());
                }
            }
        }

        for id in self.wildcard.iter() {
            if let Some(sub) = self.subs.get(id.key()) {
                if !names.contains(&sub.subscriber) && sub.pattern.matches(path).is_some() {
                    names.insert(sub.subscriber.clone());
                }
            }
        }

        names
            .into_iter()
            .filter_map(|n| {
                let inbox = self.inboxes.get(&n)?.value().clone();
                Some((n, inbox))
            })
            .collect()
    }

    pub fn inbox(&self, subscriber: &str) -> Option<Arc<MessageQueue>> {
        self.inboxes.get(subscriber).map(|r| r.value().clone())
    }

    pub fn subscription_count(&self) -> usize {
        self.subs.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inboxes.len()
    }

    /// Close every inbox (draining).
    pub fn close_all(&self) {
        for r in self.inboxes.iter() {
            r.value().close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OverflowPolicy;

    fn inbox() -> MessageQueue {
        MessageQueue::new(16, OverflowPolicy::Reject)
    }

    fn names(reg: &SubscriptionRegistry, path: &str) -> Vec<String> {
        let mut v: Vec<String> = reg.matching(path).into_iter().map(|(n, _)| n).collect();
        v.sort();
        v
    }

    #[test]
    fn static_and_wildcard_matching() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe("a", "orders/created", inbox).unwrap();
        reg.subscribe("b", "orders/*", inbox).unwrap();
        reg.subscribe("c", "users/**", inbox).unwrap();

        assert_eq!(names(&reg, "orders/created"), ["a", "b"]);
        assert_eq!(names(&reg, "orders/deleted"), ["b"]);
        assert_eq!(names(&reg, "users/1/profile"), ["c"]);
        assert!(names(&reg, "nothing").is_empty());
    }

    #[test]
    fn one_inbox_per_subscriber() {
        let reg = SubscriptionRegistry::new();
        let (_, q1) = reg.subscribe("a", "orders/created", inbox).unwrap();
        let (_, q2) = reg.subscribe("a", "orders/{kind}", inbox).unwrap();
        assert!(Arc::ptr_eq(&q1, &q2));
        assert_eq!(reg.matching("orders/created").len(), 1);
        assert_eq!(reg.subscription_count(), 2);
        assert_eq!(reg.subscriber_count(), 1);
    }

    #[test]
    fn last_unsubscribe_closes_inbox() {
        let reg = SubscriptionRegistry::new();
        let (s1, q) = reg.subscribe("a", "x/y", inbox).unwrap();
        let (s2, _) = reg.subscribe("a", "x/*", inbox).unwrap();

        assert!(reg.unsubscribe(s1));
        assert!(!q.is_closed());
        assert_eq!(names(&reg, "x/y"), ["a"]);

        assert!(reg.unsubscribe(s2));
        assert!(!reg.unsubscribe(s2));
        assert!(q.is_closed());
        assert!(reg.inbox("a").is_none());
        assert!(names(&reg, "x/y").is_empty());
    }

    #[test]
    fn remove_subscriber_drops_all() {
        let reg = SubscriptionRegistry::new();
        reg.subscribe("a", "x/1", inbox).unwrap();
        reg.subscribe("a", "x/2", inbox).unwrap();
        reg.subscribe("b", "x/1", inbox).unwrap();

        assert_eq!(reg.remove_subscriber("a"), 2);
        assert_eq!(names(&reg, "x/1"), ["b"]);
        assert_eq!(reg.remove_subscriber("a"), 0);
    }

    #[test]
    fn concurrent_churn_keeps_live_inbox_open() {
        let reg = SubscriptionRegistry::new();
        let broken = AtomicU64::new(0);

        std::thread::scope(|scope| {
            for t in 0..4 {
                let (reg, broken) = (&reg, &broken);
                scope.spawn(move || {
                    let pattern = if t % 2 == 0 { format!("x/{t}") } else { "x/{n}".to_string() };
                    let path = format!("x/{t}");
                    for _ in 0..20_000 {
                        let (id, q) = reg.subscribe("a", &pattern, inbox).unwrap();
                        let registered = reg.inbox("a").is_some_and(|cur| Arc::ptr_eq(&cur, &q));
                        let matched = reg.matching(&path).iter().any(|(n, m)| n == "a" && Arc::ptr_eq(m, &q));
                        if q.is_closed() || !registered || !matched {
                            broken.fetch_add(1, Ordering::Relaxed);
                        }
                        assert!(reg.unsubscribe(id));
                    }
                });
            }
        });

        assert_eq!(broken.load(Ordering::Relaxed), 0);
        assert_eq!(reg.subscription_count(), 0);
        assert_eq!(reg.subscriber_count(), 0);
        assert!(reg.matching("x/0").is_empty());
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let reg = SubscriptionRegistry::new();
        assert!(reg.subscribe("a", "x/**/y", inbox).is_err());
        assert_eq!(reg.subscriber_count(), 0);
    }
}
