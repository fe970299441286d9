//! In-memory event bus with topic-based pub/sub and bounded backpressure.
//!
//! Each subscriber owns a bounded FIFO queue. Publishing never blocks: a
//! full queue evicts its oldest item to admit the new one (drop-oldest),
//! and the eviction is counted globally. The subscriber cap is enforced at
//! subscribe time and surfaced as an explicit error.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

use super::types::{DomainEvent, TopicFilter};

/// Errors from bus subscription.
#[derive(Error, Debug)]
pub enum SubscribeError {
    #[error("maximum subscribers reached ({max})")]
    CapacityReached { max: usize },
}

/// One subscriber's bounded queue plus its wakeup handle.
#[derive(Debug)]
struct SubscriberQueue {
    events: Mutex<VecDeque<DomainEvent>>,
    notify: Notify,
}

impl SubscriberQueue {
    fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }
}

struct BusInner {
    /// Topic filter -> subscriber id -> queue.
    subscribers: Mutex<HashMap<TopicFilter, HashMap<Uuid, Arc<SubscriberQueue>>>>,
    queue_size: usize,
    max_subscribers: usize,
    dropped: AtomicU64,
}

/// Async event bus with topic-based fan-out and drop-oldest backpressure.
///
/// Cheap to clone; all clones share the same subscriber state.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber queue capacity and
    /// subscriber cap.
    pub fn new(queue_size: usize, max_subscribers: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                queue_size,
                max_subscribers,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Total active subscribers across all topics.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .values()
            .map(|subs| subs.len())
            .sum()
    }

    /// Total events evicted due to queue overflow.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Publish an event to subscribers of its topic and all wildcard
    /// subscribers.
    ///
    /// Never blocks and never fails: full queues evict their oldest item to
    /// admit the new one. Returns the number of subscribers that received
    /// the event.
    pub fn publish(&self, event: &DomainEvent) -> usize {
        // Snapshot the target queues so delivery happens outside the map lock.
        let targets: Vec<Arc<SubscriberQueue>> = {
            let subscribers = self.inner.subscribers.lock();
            [TopicFilter::Topic(event.topic), TopicFilter::All]
                .iter()
                .filter_map(|filter| subscribers.get(filter))
                .flat_map(|subs| subs.values().cloned())
                .collect()
        };

        let mut delivered = 0;
        for queue in targets {
            {
                let mut events = queue.events.lock();
                if events.len() >= self.inner.queue_size {
                    events.pop_front();
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                }
                events.push_back(event.clone());
            }
            queue.notify.notify_one();
            delivered += 1;
        }

        delivered
    }

    /// Subscribe to events matching `filter`.
    ///
    /// Fails once the active subscriber count reaches the configured
    /// maximum. The returned subscription unsubscribes itself on drop.
    pub fn subscribe(&self, filter: TopicFilter) -> Result<Subscription, SubscribeError> {
        let mut subscribers = self.inner.subscribers.lock();

        let active: usize = subscribers.values().map(|subs| subs.len()).sum();
        if active >= self.inner.max_subscribers {
            return Err(SubscribeError::CapacityReached {
                max: self.inner.max_subscribers,
            });
        }

        let id = Uuid::new_v4();
        let queue = Arc::new(SubscriberQueue::new());
        subscribers.entry(filter).or_default().insert(id, queue.clone());

        crate::debug_event!("bus", "subscribed", "{id} on {filter:?}");

        Ok(Subscription {
            id,
            filter,
            queue,
            bus: self.clone(),
        })
    }

    /// Remove a subscriber. Idempotent: unknown ids are ignored.
    pub fn unsubscribe(&self, filter: TopicFilter, id: Uuid) {
        let mut subscribers = self.inner.subscribers.lock();
        if let Some(subs) = subscribers.get_mut(&filter)
            && subs.remove(&id).is_some()
        {
            crate::debug_event!("bus", "unsubscribed", "{id} from {filter:?}");
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("queue_size", &self.inner.queue_size)
            .field("max_subscribers", &self.inner.max_subscribers)
            .field("dropped_events", &self.dropped_events())
            .finish()
    }
}

/// Pull handle for one subscriber. FIFO; drop to unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    filter: TopicFilter,
    queue: Arc<SubscriberQueue>,
    bus: EventBus,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receive the next event, waiting if the queue is empty.
    ///
    /// Cancel-safe: the queue is re-checked before every wait, so a wakeup
    /// lost to cancellation is recovered on the next call.
    pub async fn recv(&mut self) -> DomainEvent {
        loop {
            if let Some(event) = self.queue.events.lock().pop_front() {
                return event;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<DomainEvent> {
        self.queue.events.lock().pop_front()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.filter, self.id);
    }
}
