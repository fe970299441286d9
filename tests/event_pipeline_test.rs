//! End-to-end pipeline test: real filesystem changes flow through the
//! watcher, normalizer, and bus, and the search subscriber mirrors them
//! into the index.

use std::sync::Arc;
use std::time::Duration;

use mirador::config::ContentConfig;
use mirador::events::{
    BroadcastHub, ContentWatcher, EventBus, EventNormalizer, EventType, TopicFilter,
};
use mirador::search::{SearchIndex, run_search_subscriber};
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const DEBOUNCE_MS: u64 = 150;

fn thought_file(title: &str, body: &str) -> String {
    format!("---\ndate: \"2026-05-01\"\ntitle: {title}\n---\n{body}\n")
}

async fn wait_for_count(index: &SearchIndex, expected: u64) {
    for _ in 0..150 {
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
async fn filesystem_changes_reach_subscribers_and_the_index() {
    let dir = TempDir::new().unwrap();
    let thoughts = dir.path().join("thoughts");
    let dreams = dir.path().join("dreams");
    std::fs::create_dir_all(&thoughts).unwrap();
    std::fs::create_dir_all(&dreams).unwrap();

    let content = ContentConfig {
        thoughts_dir: thoughts.clone(),
        dreams_dir: dreams.clone(),
    };

    let bus = EventBus::new(100, 10);
    let normalizer = EventNormalizer::new(&content);
    let hub = Arc::new(BroadcastHub::new(
        bus.clone(),
        normalizer,
        Duration::from_secs(30),
    ));
    let index = Arc::new(SearchIndex::new(&content).unwrap());
    {
        let index = index.clone();
        tokio::task::spawn_blocking(move || index.rebuild())
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(index.document_count(), 0);

    let cancel = CancellationToken::new();
    let subscriber_task = tokio::spawn(run_search_subscriber(
        bus.clone(),
        index.clone(),
        cancel.clone(),
    ));

    let (mut watcher, changes) =
        ContentWatcher::start(content.watch_paths(), DEBOUNCE_MS).unwrap();
    let pump_hub = hub.clone();
    let pump = tokio::spawn(async move {
        while let Ok(change) = changes.recv_async().await {
            pump_hub.on_filesystem_event(&change);
        }
    });

    let mut subscription = bus.subscribe(TopicFilter::All).unwrap();

    // Let the watcher settle before producing changes.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Create then immediately modify twice: the burst must coalesce into a
    // single created event because created outranks modified.
    let file = thoughts.join("a.md");
    std::fs::write(&file, thought_file("First light", "The harbor at dawn.")).unwrap();
    std::fs::write(&file, thought_file("First light", "The harbor at dawn, revised.")).unwrap();
    std::fs::write(&file, thought_file("First light", "The harbor at dawn, again.")).unwrap();

    let event = timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("created event should arrive after the debounce window");
    assert_eq!(event.event_type, EventType::ThoughtCreated);
    assert_eq!(event.slug.as_deref(), Some("a"));
    assert_eq!(event.path.as_deref(), Some("a.md"));

    // The burst produced exactly one event.
    assert!(
        timeout(Duration::from_millis(400), subscription.recv())
            .await
            .is_err(),
        "burst must coalesce into a single event"
    );

    // The subscriber mirrors the create into the index.
    wait_for_count(&index, 1).await;
    assert_eq!(index.search("harbor", None, 10, 0).total, 1);

    // Later, deleting the file publishes one deleted event and empties the
    // index again.
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::remove_file(&file).unwrap();

    let event = timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("deleted event should arrive");
    assert_eq!(event.event_type, EventType::ThoughtDeleted);
    assert_eq!(event.slug.as_deref(), Some("a"));

    wait_for_count(&index, 0).await;
    assert_eq!(index.search("harbor", None, 10, 0).total, 0);

    cancel.cancel();
    subscriber_task.await.unwrap().unwrap();
    watcher.stop();
    pump.await.unwrap();
}

#[tokio::test]
async fn temp_files_never_become_events() {
    let dir = TempDir::new().unwrap();
    let thoughts = dir.path().join("thoughts");
    let dreams = dir.path().join("dreams");
    std::fs::create_dir_all(&thoughts).unwrap();
    std::fs::create_dir_all(&dreams).unwrap();

    let content = ContentConfig {
        thoughts_dir: thoughts.clone(),
        dreams_dir: dreams,
    };

    let bus = EventBus::new(100, 10);
    let hub = Arc::new(BroadcastHub::new(
        bus.clone(),
        EventNormalizer::new(&content),
        Duration::from_secs(30),
    ));

    let (mut watcher, changes) = ContentWatcher::start(content.watch_paths(), 50).unwrap();
    let pump_hub = hub.clone();
    let pump = tokio::spawn(async move {
        while let Ok(change) = changes.recv_async().await {
            pump_hub.on_filesystem_event(&change);
        }
    });

    let mut subscription = bus.subscribe(TopicFilter::All).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Editor droppings and invalid slugs are filtered along the pipeline.
    std::fs::write(thoughts.join(".a.md.swp"), "swap").unwrap();
    std::fs::write(thoughts.join("draft.tmp"), "scratch").unwrap();
    std::fs::write(thoughts.join("bad name.md"), "spaced").unwrap();

    assert!(
        timeout(Duration::from_millis(600), subscription.recv())
            .await
            .is_err(),
        "filtered files must not produce events"
    );

    watcher.stop();
    pump.await.unwrap();
}
