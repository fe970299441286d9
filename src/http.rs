//! HTTP serving: SSE event streams, search queries, and service wiring.

use std::convert::Infallible;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::{Router, routing::get};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::events::{BroadcastHub, ContentWatcher, EventBus, EventNormalizer, TopicFilter};
use crate::search::{ContentType, SearchIndex, SearchResponse, run_search_subscriber};

#[derive(Clone)]
struct AppState {
    hub: Arc<BroadcastHub>,
    index: Arc<SearchIndex>,
}

#[derive(Deserialize)]
struct EventsParams {
    topic: Option<String>,
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    #[serde(rename = "type")]
    content_type: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn events_handler(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let filter = TopicFilter::parse(params.topic.as_deref().unwrap_or("*"));
    let frames = state.hub.create_stream(filter).map_err(|e| {
        tracing::warn!("stream rejected: {e}");
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    let stream =
        frames.map(|frame| Ok(SseEvent::default().event(frame.event).data(frame.data)));
    Ok(Sse::new(stream))
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    let query = params.q.unwrap_or_default();
    let content_type = params.content_type.as_deref().and_then(ContentType::parse);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0);

    Json(state.index.search(&query, content_type, limit, offset))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    crate::log_event!("http", "shutting down");
}

/// Wire up the full service and serve it until ctrl-c.
///
/// Startup order: rebuild the index from disk, start the search
/// subscriber, start the watcher, then accept connections. Watcher
/// startup failures (missing content directories) are fatal here.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let bus = EventBus::new(
        settings.events.queue_size,
        settings.events.max_subscribers,
    );
    let normalizer = EventNormalizer::new(&settings.content);
    let hub = Arc::new(BroadcastHub::new(
        bus.clone(),
        normalizer,
        Duration::from_secs(settings.events.heartbeat_secs),
    ));
    let index = Arc::new(SearchIndex::new(&settings.content)?);

    // The startup rebuild is the only full rescan; the subscriber owns all
    // further index changes.
    {
        let index = index.clone();
        tokio::task::spawn_blocking(move || index.rebuild()).await??;
    }

    let ct = CancellationToken::new();

    let subscriber_task = tokio::spawn(run_search_subscriber(
        bus.clone(),
        index.clone(),
        ct.clone(),
    ));

    let (mut watcher, changes) = ContentWatcher::start(
        settings.content.watch_paths(),
        settings.events.debounce_ms,
    )?;

    let pump_hub = hub.clone();
    let pump_ct = ct.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = pump_ct.cancelled() => break,
                change = changes.recv_async() => match change {
                    Ok(change) => pump_hub.on_filesystem_event(&change),
                    Err(_) => break,
                },
            }
        }
    });

    let state = AppState {
        hub,
        index,
    };
    let router = Router::new()
        .route("/events", get(events_handler))
        .route("/search", get(search_handler))
        .route("/health", get(health_check))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    crate::log_event!("http", "listening", "http://{}", settings.server.bind);

    // A plain select rather than graceful shutdown: open event streams
    // never complete, so draining them would wait forever.
    let server = axum::serve(listener, router).into_future();
    tokio::select! {
        result = server => {
            result?;
        }
        _ = shutdown_signal() => {}
    }

    ct.cancel();
    watcher.stop();
    let _ = subscriber_task.await;
    crate::log_event!("http", "stopped", "dropped events: {}", bus.dropped_events());
    Ok(())
}
