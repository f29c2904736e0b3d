//! End-to-end propagation: a mutation on the question store reaches the
//! search index through outbox, relay, bus, subscriber, and projector.
//! This composes the whole path between the system of record and the index
//! in-process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use askstack_core::types::Tag;
use askstack_server::bus::{EventBus, MemoryBus};
use askstack_server::relay::{Flush, OutboxRelay};
use askstack_server::search::{subscriber, Projector, SearchIndex};
use askstack_server::storage::{MemoryStore, NewAnswer, NewQuestion, QuestionStore};
use askstack_server::worker::BackgroundWorker;

struct Pipeline {
    store: Arc<MemoryStore>,
    index: Arc<SearchIndex>,
    relay: BackgroundWorker<OutboxRelay>,
    shutdown_tx: watch::Sender<bool>,
    subscriber: tokio::task::JoinHandle<()>,
}

async fn pipeline() -> Pipeline {
    let store = Arc::new(MemoryStore::new());
    store
        .put_tag(Tag {
            slug: "rust".to_string(),
            name: "Rust".to_string(),
            description: None,
        })
        .await
        .unwrap();

    let bus: Arc<MemoryBus> = Arc::new(MemoryBus::default());
    let index = Arc::new(SearchIndex::open_in_ram().unwrap());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let subscriber = subscriber::spawn(
        bus.clone() as Arc<dyn EventBus>,
        Projector::new(Arc::clone(&index)),
        shutdown_rx,
    );
    // Let the subscription open before anything publishes.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let relay = BackgroundWorker::start(
        OutboxRelay::new(
            store.clone() as Arc<dyn QuestionStore>,
            bus as Arc<dyn EventBus>,
        ),
        50,
    );

    Pipeline {
        store,
        index,
        relay,
        shutdown_tx,
        subscriber,
    }
}

impl Pipeline {
    async fn stop(mut self) {
        self.relay.stop().await;
        self.shutdown_tx.send(true).unwrap();
        self.subscriber.await.unwrap();
    }
}

async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn new_question(title: &str) -> NewQuestion {
    NewQuestion {
        title: title.to_string(),
        content: "There is a question body here.".to_string(),
        tags: vec!["rust".to_string()],
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn created_question_becomes_searchable() {
    let pipeline = pipeline().await;

    let question = pipeline
        .store
        .create_question(new_question("Propagation basics"), "u1", "Ada")
        .await
        .unwrap();
    pipeline.relay.handle().nudge(Flush);

    let index = Arc::clone(&pipeline.index);
    let id = question.id;
    eventually("document indexed", || {
        index.fetch(id).unwrap().is_some()
    })
    .await;

    let (hits, total) = pipeline.index.search("propagation", None, 10).unwrap();
    assert_eq!(total, 1);
    assert_eq!(hits[0].document.id, id);
    assert_eq!(hits[0].document.title, "Propagation basics");
    assert_eq!(hits[0].document.tags, vec!["rust"]);

    pipeline.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn answer_lifecycle_updates_the_document() {
    let pipeline = pipeline().await;

    let question = pipeline
        .store
        .create_question(new_question("Counts and accepts"), "asker", "Ada")
        .await
        .unwrap();
    let answer = pipeline
        .store
        .add_answer(
            question.id,
            NewAnswer {
                content: "An answer.".to_string(),
            },
            "helper",
            "Grace",
        )
        .await
        .unwrap();
    pipeline
        .store
        .accept_answer(question.id, answer.id, "asker")
        .await
        .unwrap();
    pipeline.relay.handle().nudge(Flush);

    let index = Arc::clone(&pipeline.index);
    let id = question.id;
    eventually("count and accept projected", || {
        index
            .fetch(id)
            .unwrap()
            .is_some_and(|doc| doc.answer_count == 1 && doc.has_accepted_answer)
    })
    .await;

    pipeline.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_question_leaves_the_index() {
    let pipeline = pipeline().await;

    let question = pipeline
        .store
        .create_question(new_question("Short lived"), "u1", "Ada")
        .await
        .unwrap();
    pipeline.relay.handle().nudge(Flush);

    let index = Arc::clone(&pipeline.index);
    let id = question.id;
    eventually("document indexed", || {
        index.fetch(id).unwrap().is_some()
    })
    .await;

    pipeline.store.delete_question(id, "u1").await.unwrap();
    pipeline.relay.handle().nudge(Flush);

    eventually("document removed", || {
        index.fetch(id).unwrap().is_none()
    })
    .await;

    let (_, total) = pipeline.index.search("", None, 10).unwrap();
    assert_eq!(total, 0);

    pipeline.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn relay_tick_delivers_without_a_nudge() {
    let pipeline = pipeline().await;

    // No nudge here: only the periodic tick (50ms in this harness) runs.
    let question = pipeline
        .store
        .create_question(new_question("Tick driven"), "u1", "Ada")
        .await
        .unwrap();

    let index = Arc::clone(&pipeline.index);
    let id = question.id;
    eventually("tick delivered the event", || {
        index.fetch(id).unwrap().is_some()
    })
    .await;

    pipeline.stop().await;
}
