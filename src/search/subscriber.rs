//! Event bus subscriber keeping the search index in sync.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::events::{ChangeAction, DomainEvent, EventBus, SubscribeError, Topic, TopicFilter};

use super::index::{ContentType, SearchIndex};

fn content_type_for(topic: Topic) -> Option<ContentType> {
    match topic {
        Topic::Thoughts => Some(ContentType::Thought),
        Topic::Dreams => Some(ContentType::Dream),
        Topic::System => None,
    }
}

/// Consume the wildcard event stream and mirror changes into the index.
///
/// Runs for the process lifetime as a background task. Index mutation is
/// dispatched to the blocking pool so commits never stall the scheduler.
/// Per-event failures are logged and skipped; only cancellation ends the
/// loop. Consistency is eventual: a missed event leaves the index stale
/// until the next startup rebuild.
pub async fn run_search_subscriber(
    bus: EventBus,
    index: Arc<SearchIndex>,
    cancel: CancellationToken,
) -> Result<(), SubscribeError> {
    let mut subscription = bus.subscribe(TopicFilter::All)?;
    crate::log_event!("search-sync", "started", "subscriber {}", subscription.id());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                crate::log_event!("search-sync", "stopped");
                return Ok(());
            }
            event = subscription.recv() => {
                handle_event(&index, &event).await;
            }
        }
    }
}

async fn handle_event(index: &Arc<SearchIndex>, event: &DomainEvent) {
    let Some(action) = event.event_type.change_action() else {
        return;
    };
    let Some(slug) = event.slug.clone() else {
        return;
    };
    let Some(content_type) = content_type_for(event.topic) else {
        return;
    };

    match action {
        ChangeAction::Upsert => {
            let path = index.content_path(content_type, &slug);
            // The file may be gone by the time a queued create/modify event
            // is processed; deletion will arrive as its own event.
            if !path.exists() {
                crate::debug_event!("search-sync", "skipped stale event", "{}", path.display());
                return;
            }
            let index = index.clone();
            match tokio::task::spawn_blocking(move || index.upsert_document(&path)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(slug = %slug, "search upsert failed: {e}"),
                Err(e) => tracing::error!("search upsert task failed: {e}"),
            }
        }
        ChangeAction::Delete => {
            let index = index.clone();
            let owned_slug = slug.clone();
            match tokio::task::spawn_blocking(move || {
                index.delete_document(&owned_slug, content_type)
            })
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(slug = %slug, "search delete failed: {e}"),
                Err(e) => tracing::error!("search delete task failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContentConfig;
    use crate::events::EventType;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        bus: EventBus,
        index: Arc<SearchIndex>,
        _dir: TempDir,
        thoughts: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let thoughts = dir.path().join("thoughts");
        let dreams = dir.path().join("dreams");
        std::fs::create_dir_all(&thoughts).unwrap();
        std::fs::create_dir_all(&dreams).unwrap();

        let index = Arc::new(
            SearchIndex::new(&ContentConfig {
                thoughts_dir: thoughts.clone(),
                dreams_dir: dreams,
            })
            .unwrap(),
        );

        Fixture {
            bus: EventBus::new(32, 8),
            index,
            _dir: dir,
            thoughts,
        }
    }

    fn write_thought(dir: &Path, slug: &str) {
        let mut file = std::fs::File::create(dir.join(format!("{slug}.md"))).unwrap();
        write!(
            file,
            "---\ndate: \"2026-04-01\"\ntitle: Entry {slug}\n---\nSome body text.\n"
        )
        .unwrap();
    }

    fn content_event(event_type: EventType, slug: &str) -> DomainEvent {
        DomainEvent::new(
            event_type,
            Topic::Thoughts,
            Some(format!("{slug}.md")),
            Some(slug.to_string()),
        )
    }

    async fn wait_for_count(index: &SearchIndex, expected: u64) {
        for _ in 0..100 {
            if index.document_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "index never reached {expected} documents (at {})",
            index.document_count()
        );
    }

    #[tokio::test]
    async fn create_and_delete_events_mutate_the_index() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_search_subscriber(
            f.bus.clone(),
            f.index.clone(),
            cancel.clone(),
        ));

        // Give the subscriber a moment to register.
        tokio::time::sleep(Duration::from_millis(20)).await;

        write_thought(&f.thoughts, "arrival");
        f.bus
            .publish(&content_event(EventType::ThoughtCreated, "arrival"));
        wait_for_count(&f.index, 1).await;

        std::fs::remove_file(f.thoughts.join("arrival.md")).unwrap();
        f.bus
            .publish(&content_event(EventType::ThoughtDeleted, "arrival"));
        wait_for_count(&f.index, 0).await;

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stale_create_events_are_skipped() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_search_subscriber(
            f.bus.clone(),
            f.index.clone(),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // No file on disk for this slug.
        f.bus
            .publish(&content_event(EventType::ThoughtCreated, "ghost"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.index.document_count(), 0);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn heartbeats_and_slugless_events_are_ignored() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_search_subscriber(
            f.bus.clone(),
            f.index.clone(),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;

        f.bus.publish(&DomainEvent::heartbeat());
        f.bus.publish(&DomainEvent::new(
            EventType::ThoughtCreated,
            Topic::Thoughts,
            None,
            None,
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.index.document_count(), 0);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancellation_releases_the_subscription() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_search_subscriber(
            f.bus.clone(),
            f.index.clone(),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.bus.subscriber_count(), 1);

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(f.bus.subscriber_count(), 0);
    }
}
