//! Broadcast hub: bridges bus subscriptions into outbound frame streams
//! with heartbeat injection.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::bus::{EventBus, SubscribeError};
use super::normalizer::EventNormalizer;
use super::types::{DomainEvent, RawChange, TopicFilter};

/// Events buffered between the bus subscription and frame emission. Real
/// event latency is bounded by this buffer, not the heartbeat period.
const STREAM_BUFFER: usize = 10;

/// An outbound server-push frame: event name plus JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: &'static str,
    pub data: String,
}

impl Frame {
    fn from_event(event: &DomainEvent) -> Option<Self> {
        match serde_json::to_string(event) {
            Ok(data) => Some(Self {
                event: event.event_type.as_str(),
                data,
            }),
            Err(e) => {
                tracing::error!("failed to serialize event {}: {e}", event.id);
                None
            }
        }
    }
}

/// Outbound frame stream for one client connection.
///
/// Dropping the stream triggers the hub's cleanup: the pump stops, the bus
/// subscription is released, and the connection counter is decremented.
#[derive(Debug)]
pub struct FrameStream {
    frames: mpsc::Receiver<Frame>,
}

impl Stream for FrameStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.frames.poll_recv(cx)
    }
}

/// Fan-out hub between the filesystem pipeline and streaming clients.
pub struct BroadcastHub {
    bus: EventBus,
    normalizer: EventNormalizer,
    heartbeat_interval: Duration,
    active_connections: AtomicUsize,
}

impl BroadcastHub {
    pub fn new(bus: EventBus, normalizer: EventNormalizer, heartbeat_interval: Duration) -> Self {
        Self {
            bus,
            normalizer,
            heartbeat_interval,
            active_connections: AtomicUsize::new(0),
        }
    }

    /// Number of live outbound streams.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Entry point for debounced filesystem changes: normalize and publish.
    /// Changes that fail normalization are dropped here.
    pub fn on_filesystem_event(&self, change: &RawChange) {
        let Some(event) = self.normalizer.normalize(change) else {
            return;
        };
        let delivered = self.bus.publish(&event);
        crate::debug_event!(
            "hub",
            "published",
            "{} {:?} -> {delivered} subscribers",
            event.event_type.as_str(),
            event.slug
        );
    }

    /// Open an outbound frame stream for one client.
    ///
    /// A pump task moves events from the bus subscription into a small
    /// buffer; the frame loop emits each buffered event as it arrives and
    /// synthesizes a heartbeat whenever `heartbeat_interval` passes without
    /// one, so clients see a frame at least that often. Every exit path
    /// stops the pump, releases the subscription, and decrements the
    /// connection counter.
    pub fn create_stream(
        self: &Arc<Self>,
        filter: TopicFilter,
    ) -> Result<FrameStream, SubscribeError> {
        let mut subscription = self.bus.subscribe(filter)?;
        let subscriber_id = subscription.id();
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        crate::log_event!(
            "hub",
            "client connected",
            "{subscriber_id} on {filter:?}, {} active",
            self.active_connections()
        );

        let (buffer_tx, mut buffer_rx) = mpsc::channel::<DomainEvent>(STREAM_BUFFER);
        let pump = tokio::spawn(async move {
            loop {
                let event = subscription.recv().await;
                if buffer_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        let (frame_tx, frame_rx) = mpsc::channel::<Frame>(1);
        let hub = self.clone();
        let heartbeat_interval = self.heartbeat_interval;
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    next = timeout(heartbeat_interval, buffer_rx.recv()) => match next {
                        Ok(Some(event)) => Frame::from_event(&event),
                        Ok(None) => break,
                        Err(_) => Frame::from_event(&DomainEvent::heartbeat()),
                    },
                    _ = frame_tx.closed() => break,
                };
                let Some(frame) = frame else {
                    continue;
                };
                if frame_tx.send(frame).await.is_err() {
                    break;
                }
            }

            // Cleanup runs on every exit path: client disconnect, pump
            // failure, and task cancellation at shutdown all land here.
            pump.abort();
            let _ = pump.await;
            hub.active_connections.fetch_sub(1, Ordering::Relaxed);
            crate::log_event!(
                "hub",
                "client disconnected",
                "{subscriber_id}, {} active",
                hub.active_connections()
            );
        });

        Ok(FrameStream { frames: frame_rx })
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("active_connections", &self.active_connections())
            .finish()
    }
}
