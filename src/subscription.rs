//! Subscription records held by the registry

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handler::Handler;
use crate::pattern::{MatchOutcome, PathPattern};

/// Opaque handle returned by [`crate::Bus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single registered subscription
///
/// Owns a per-topic memoization map so repeated publications to the same
/// concrete topic skip re-matching this subscription's pattern. No
/// subscription or handler may mutate another subscription's memo — each one
/// owns its own [`DashMap`].
pub struct Subscription {
    pub id: SubscriptionId,
    pub pattern: PathPattern,
    pub handler: Arc<dyn Handler>,
    pub once: bool,
    memo: DashMap<String, MatchOutcome>,
}

impl Subscription {
    pub fn new(pattern: PathPattern, handler: Arc<dyn Handler>, once: bool) -> Self {
        Self {
            id: SubscriptionId::new(),
            pattern,
            handler,
            once,
            memo: DashMap::new(),
        }
    }

    /// Match `topic` against this subscription's pattern, consulting (and
    /// populating, on a miss that matched) the per-topic memo
    pub fn match_topic(&self, topic: &str) -> MatchOutcome {
        if let Some(cached) = self.memo.get(topic) {
            return cached.clone();
        }
        let outcome = self.pattern.match_path(topic);
        if outcome.matched {
            self.memo.insert(topic.to_string(), outcome.clone());
        }
        outcome
    }
}
