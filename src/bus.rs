//! The subscription registry and publish dispatcher

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::BusError;
use crate::handler::Handler;
use crate::merge::deep_merge;
use crate::pattern::{MatchOutcome, ParamValue, PathPattern};
use crate::subscription::{Subscription, SubscriptionId};

/// Bus configuration
///
/// `continue_on_error` is not configurable: a handler's failure must never
/// prevent other handlers from running or propagate out of `publish`, so the
/// bus always continues.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Emit `tracing` events on subscribe/publish/unsubscribe
    pub enable_logging: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
        }
    }
}

/// Builder for [`BusConfig`]
#[derive(Debug, Default)]
pub struct BusBuilder {
    config: BusConfig,
}

impl BusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    pub fn build(self) -> Bus {
        Bus::with_config(self.config)
    }
}

/// What to remove in [`Bus::unsubscribe`]
pub enum UnsubscribeTarget {
    /// Remove exactly this subscription
    Handle(SubscriptionId),
    /// Remove every subscription whose compiled pattern matches this string
    /// as if it were a topic
    Topic(String),
}

/// Process-wide pub/sub bus with path-pattern routing
#[derive(Clone)]
pub struct Bus {
    subscriptions: Arc<DashMap<SubscriptionId, Subscription>>,
    in_flight: Arc<AtomicI64>,
    config: Arc<BusConfig>,
}

impl Bus {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            subscriptions: Arc::new(DashMap::new()),
            in_flight: Arc::new(AtomicI64::new(0)),
            config: Arc::new(config),
        }
    }

    /// Register a handler for every publication whose topic matches `pattern`
    pub fn subscribe<H>(&self, pattern: &str, handler: H) -> Result<SubscriptionId, BusError>
    where
        H: Handler,
    {
        self.subscribe_inner(pattern, Arc::new(handler), false)
    }

    /// Like [`Bus::subscribe`], but the subscription is removed after its
    /// handler is dispatched for the first matching publication
    pub fn subscribe_once<H>(&self, pattern: &str, handler: H) -> Result<SubscriptionId, BusError>
    where
        H: Handler,
    {
        self.subscribe_inner(pattern, Arc::new(handler), true)
    }

    fn subscribe_inner(
        &self,
        pattern: &str,
        handler: Arc<dyn Handler>,
        once: bool,
    ) -> Result<SubscriptionId, BusError> {
        let compiled = PathPattern::new(pattern)?;
        let subscription = Subscription::new(compiled, handler, once);
        let id = subscription.id;
        self.subscriptions.insert(id, subscription);

        if self.config.enable_logging {
            debug!(subscription = %id, pattern, once, "subscribed");
        }
        Ok(id)
    }

    /// Remove a subscription by handle (idempotent) or every subscription
    /// whose pattern matches a topic string. Returns the number removed.
    pub fn unsubscribe(&self, target: UnsubscribeTarget) -> usize {
        let removed = match target {
            UnsubscribeTarget::Handle(id) => usize::from(self.subscriptions.remove(&id).is_some()),
            UnsubscribeTarget::Topic(topic) => {
                let matching: Vec<SubscriptionId> = self
                    .subscriptions
                    .iter()
                    .filter(|entry| entry.value().pattern.match_path(&topic).matched)
                    .map(|entry| *entry.key())
                    .collect();
                for id in &matching {
                    self.subscriptions.remove(id);
                }
                matching.len()
            }
        };

        if self.config.enable_logging && removed > 0 {
            debug!(removed, "unsubscribed");
        }
        removed
    }

    /// Number of `publish` calls currently in flight
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// A single-shot token that resolves the next time a publication
    /// matches `topic`. Implemented as a `once` subscription whose handler
    /// feeds a oneshot channel. `topic` is compiled as a pattern exactly as
    /// `subscribe` does, so a malformed topic surfaces as `InvalidPattern`
    /// here rather than panicking.
    pub fn once(&self, topic: &str) -> Result<OnceToken, BusError> {
        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let id = self.subscribe_once(topic, move |args: Value| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(args);
            }
            std::future::ready(Ok::<(), BusError>(()))
        })?;
        Ok(OnceToken { id, rx })
    }

    /// Publish to every matching subscription
    ///
    /// Increments `in_flight` synchronously before any suspension point,
    /// yields once to freeze the subscription snapshot (subscribers added
    /// during the caller's current synchronous continuation are excluded),
    /// dispatches matching handlers concurrently, and decrements `in_flight`
    /// once every handler has settled. Handler failures are logged and never
    /// propagate.
    pub async fn publish(&self, topic: &str, user_args: Value) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        if self.config.enable_logging {
            info!(topic, "publishing");
        }

        tokio::task::yield_now().await;

        let mut matches = Vec::new();
        let mut once_ids = Vec::new();
        for entry in self.subscriptions.iter() {
            let outcome = entry.value().match_topic(topic);
            if outcome.matched {
                if entry.value().once {
                    once_ids.push(*entry.key());
                }
                matches.push((
                    entry.value().handler.clone(),
                    build_args(&user_args, &outcome, topic),
                ));
            }
        }
        for id in &once_ids {
            self.subscriptions.remove(id);
        }

        if matches.is_empty() && self.config.enable_logging {
            warn!(topic, "no subscribers matched publication");
        }

        tokio::task::yield_now().await;

        let mut tasks = Vec::with_capacity(matches.len());
        for (handler, args) in matches {
            tasks.push(tokio::spawn(async move { handler.call(args).await }));
        }

        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(topic, error = %e, "handler failed"),
                Err(join_err) => error!(topic, error = %join_err, "handler task panicked"),
            }
        }

        self.in_flight.fetch_add(-1, Ordering::SeqCst);
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

fn build_args(user_args: &Value, outcome: &MatchOutcome, topic: &str) -> Value {
    let named_params = params_to_value(outcome);
    let merged = deep_merge(user_args, &named_params);

    let mut reserved = Map::new();
    reserved.insert(
        "_".to_string(),
        Value::Array(outcome.wildcards.iter().cloned().map(Value::String).collect()),
    );
    reserved.insert("topic".to_string(), Value::String(topic.to_string()));

    deep_merge(&merged, &Value::Object(reserved))
}

fn params_to_value(outcome: &MatchOutcome) -> Value {
    let mut map = Map::new();
    for (name, value) in &outcome.params {
        let json_value = match value {
            ParamValue::Single(s) => Value::String(s.clone()),
            ParamValue::Many(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        };
        map.insert(name.clone(), json_value);
    }
    Value::Object(map)
}

/// Single-shot completion handle returned by [`Bus::once`]
pub struct OnceToken {
    id: SubscriptionId,
    rx: oneshot::Receiver<Value>,
}

impl OnceToken {
    /// The underlying subscription id, in case the caller wants to cancel
    /// via [`Bus::unsubscribe`] before it ever fires
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next matching publication's merged args
    pub async fn wait(self) -> Option<Value> {
        self.rx.await.ok()
    }
}

/// The process-wide default bus instance
static GLOBAL: Lazy<Bus> = Lazy::new(Bus::new);

/// Access the process-wide default bus
pub fn global() -> &'static Bus {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn new_bus() -> Bus {
        Bus::with_config(BusConfig {
            enable_logging: false,
        })
    }

    #[tokio::test]
    async fn publish_routes_params_to_handler() {
        let bus = new_bus();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_clone = seen.clone();

        bus.subscribe("/order/:status/:item", move |args: Value| {
            let seen = seen_clone.clone();
            async move {
                *seen.lock().unwrap() = Some(args);
                Ok::<(), BusError>(())
            }
        })
        .unwrap();

        bus.publish("/order/created/book", json!({})).await;

        let args = seen.lock().unwrap().clone().unwrap();
        assert_eq!(args["topic"], "/order/created/book");
        assert_eq!(args["status"], "created");
        assert_eq!(args["item"], "book");
        assert_eq!(args["_"], json!([]));
    }

    #[tokio::test]
    async fn arg_precedence_matches_spec_example() {
        let bus = new_bus();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_clone = seen.clone();

        bus.subscribe("/arg/:test1/:test2/**", move |args: Value| {
            let seen = seen_clone.clone();
            async move {
                *seen.lock().unwrap() = Some(args);
                Ok::<(), BusError>(())
            }
        })
        .unwrap();

        bus.publish("/arg/A/B/C/D", json!({ "test5": "v" })).await;

        let args = seen.lock().unwrap().clone().unwrap();
        assert_eq!(
            args,
            json!({
                "topic": "/arg/a/b/c/d",
                "test1": "a",
                "test2": "b",
                "_": ["c", "d"],
                "test5": "v",
            })
        );
    }

    #[tokio::test]
    async fn once_subscription_fires_at_most_once() {
        let bus = new_bus();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();

        bus.subscribe_once("/ping", move |_args: Value| {
            let count = count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BusError>(())
            }
        })
        .unwrap();

        bus.publish("/ping", json!({})).await;
        bus.publish("/ping", json!({})).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_isolation_does_not_stop_other_handlers() {
        let bus = new_bus();
        let second_ran = Arc::new(AtomicU32::new(0));
        let second_clone = second_ran.clone();

        bus.subscribe("/topic", |_args: Value| async move {
            Err(BusError::HandlerFailed("boom".to_string()))
        })
        .unwrap();
        bus.subscribe("/topic", move |_args: Value| {
            let second = second_clone.clone();
            async move {
                second.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BusError>(())
            }
        })
        .unwrap();

        bus.publish("/topic", json!({})).await;

        assert_eq!(second_ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn in_flight_tracks_overlapping_publishes() {
        let bus = new_bus();
        let gate = Arc::new(tokio::sync::Notify::new());
        let gate_clone = gate.clone();

        bus.subscribe("/slow", move |_args: Value| {
            let gate = gate_clone.clone();
            async move {
                gate.notified().await;
                Ok::<(), BusError>(())
            }
        })
        .unwrap();

        let bus1 = bus.clone();
        let bus2 = bus.clone();
        let first = tokio::spawn(async move { bus1.publish("/slow", json!({})).await });
        let second = tokio::spawn(async move { bus2.publish("/slow", json!({})).await });

        // Give both publishes a chance to pass their first yield and
        // register as in flight before we inspect the counter.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bus.in_flight(), 2);

        gate.notify_waiters();
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(bus.in_flight(), 0);
    }

    #[tokio::test]
    async fn subscriber_registered_after_yield_is_not_invoked() {
        let bus = new_bus();
        let ran = Arc::new(AtomicU32::new(0));
        let ran_clone = ran.clone();
        let bus_clone = bus.clone();

        let publish = tokio::spawn(async move { bus_clone.publish("/late", json!({})).await });
        // Let the spawned publish progress past its snapshot-freezing yield
        // before we register a subscriber.
        tokio::task::yield_now().await;

        bus.subscribe("/late", move |_args: Value| {
            let ran = ran_clone.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BusError>(())
            }
        })
        .unwrap();

        publish.await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsubscribe_by_handle_is_idempotent() {
        let bus = new_bus();
        let id = bus
            .subscribe("/x", |_args: Value| async move { Ok::<(), BusError>(()) })
            .unwrap();
        assert_eq!(bus.unsubscribe(UnsubscribeTarget::Handle(id)), 1);
        assert_eq!(bus.unsubscribe(UnsubscribeTarget::Handle(id)), 0);
    }

    #[tokio::test]
    async fn unsubscribe_by_topic_removes_matching_patterns() {
        let bus = new_bus();
        bus.subscribe("/a/:x", |_args: Value| async move { Ok::<(), BusError>(()) })
            .unwrap();
        bus.subscribe("/b/:x", |_args: Value| async move { Ok::<(), BusError>(()) })
            .unwrap();

        let removed = bus.unsubscribe(UnsubscribeTarget::Topic("/a/1".to_string()));
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn once_token_resolves_on_next_matching_publish() {
        let bus = new_bus();
        let token = bus.once("/greeting").unwrap();

        bus.publish("/greeting", json!({ "who": "world" })).await;

        let args = token.wait().await.unwrap();
        assert_eq!(args["who"], "world");
    }

    #[tokio::test]
    async fn once_rejects_malformed_topic_without_panicking() {
        let bus = new_bus();
        let err = bus.once("/foo[bar").unwrap_err();
        assert!(matches!(err, BusError::InvalidPattern { .. }));
    }
}
