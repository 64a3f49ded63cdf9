use async_trait::async_trait;
use audio_archive_bot::bot::views;
use audio_archive_bot::bot::{
    BatchConsumer, ConsumerError, Event, IncomingUpdate, Reply, ReplySink, TransportError,
    UpdateListener, UpdateSource,
};
use audio_archive_bot::media::{Audio, AudioExtractor, ExtractError, ExtractStage};
use audio_archive_bot::storage::ArchiveStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Extractor answering from memory; URLs containing "broken" fail.
#[derive(Default)]
struct FakeExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl AudioExtractor for FakeExtractor {
    async fn extract(&self, url: &str) -> Result<Audio, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.contains("broken") {
            return Err(ExtractError::ExtractionFailed {
                stage: ExtractStage::Download,
                reason: "exit code 1: ERROR: unavailable".to_string(),
            });
        }
        Ok(Audio {
            url: url.to_string(),
            title: "My Title".to_string(),
            data: b"ID3fake-mp3".to_vec(),
        })
    }
}

/// Hands out scripted batches, then fails like a lost connection.
#[derive(Clone, Default)]
struct ScriptedSource {
    batches: Arc<Mutex<VecDeque<Vec<IncomingUpdate>>>>,
    offsets: Arc<Mutex<Vec<i32>>>,
}

impl ScriptedSource {
    fn push(&self, batch: Vec<IncomingUpdate>) {
        self.batches.lock().expect("lock").push_back(batch);
    }

    fn offsets(&self) -> Vec<i32> {
        self.offsets.lock().expect("lock").clone()
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn fetch(&self, offset: i32, _limit: u8) -> Result<Vec<IncomingUpdate>, TransportError> {
        self.offsets.lock().expect("lock").push(offset);
        self.batches
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or(TransportError::Failed {
                operation: "getUpdates",
                reason: "connection reset".to_string(),
            })
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    replies: Arc<Mutex<Vec<Reply>>>,
    reject: bool,
}

impl RecordingSink {
    fn replies(&self) -> Vec<Reply> {
        self.replies.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn deliver(&self, reply: Reply) -> Result<(), TransportError> {
        self.replies.lock().expect("lock").push(reply);
        if self.reject {
            return Err(TransportError::Failed {
                operation: "sendMessage",
                reason: "chat not found".to_string(),
            });
        }
        Ok(())
    }
}

struct Harness {
    store: Arc<ArchiveStore>,
    extractor: Arc<FakeExtractor>,
    source: ScriptedSource,
    sink: RecordingSink,
    consumer: BatchConsumer<ScriptedSource, RecordingSink>,
}

impl Harness {
    fn new() -> Self {
        Self::with_sink(RecordingSink::default())
    }

    fn with_sink(sink: RecordingSink) -> Self {
        let store = ArchiveStore::open_in_memory().expect("open store");
        store.ensure_schema().expect("schema");
        let store = Arc::new(store);
        let extractor = Arc::new(FakeExtractor::default());
        let source = ScriptedSource::default();

        let listener = UpdateListener::new(store.clone(), extractor.clone());
        let consumer = BatchConsumer::new(source.clone(), sink.clone(), listener, 100);
        Self {
            store,
            extractor,
            source,
            sink,
            consumer,
        }
    }

    fn extractions(&self) -> usize {
        self.extractor.calls.load(Ordering::SeqCst)
    }
}

fn message(id: i32, username: &str, text: &str) -> IncomingUpdate {
    IncomingUpdate {
        id,
        event: Some(Event::Message {
            chat_id: 42,
            message_id: id * 10,
            username: username.to_string(),
            text: text.to_string(),
        }),
    }
}

fn callback(id: i32, username: &str, data: &str) -> IncomingUpdate {
    IncomingUpdate {
        id,
        event: Some(Event::Callback {
            chat_id: 42,
            message_id: 777,
            username: username.to_string(),
            data: data.to_string(),
        }),
    }
}

fn text_of(reply: &Reply) -> &str {
    match reply {
        Reply::Text { text, .. } => text,
        other => panic!("expected text reply, got {other:?}"),
    }
}

#[tokio::test]
async fn archives_once_and_lists_until_the_poll_fails() {
    let h = Harness::new();
    h.source.push(vec![
        message(5, "alice", "https://example.com/v1"),
        message(6, "alice", "https://example.com/v1"),
        message(7, "alice", "/playlist"),
    ]);

    let err = h
        .consumer
        .run(CancellationToken::new())
        .await
        .expect_err("stops when the poll fails");
    assert!(matches!(err, ConsumerError::Fetch { offset: 8, .. }));
    assert_eq!(h.source.offsets(), vec![0, 8]);

    assert_eq!(h.extractions(), 1);
    let playlist = h.store.playlist("alice").expect("playlist");
    assert_eq!(playlist.len(), 1);
    let handle = playlist[0].uuid.clone();

    let replies = h.sink.replies();
    assert_eq!(replies.len(), 3);
    match &replies[0] {
        Reply::Audio {
            chat_id,
            title,
            data,
            caption,
            buttons,
        } => {
            assert_eq!(*chat_id, 42);
            assert_eq!(title, "My Title");
            assert_eq!(data, b"ID3fake-mp3");
            assert!(caption.contains("My Title"));
            assert!(caption.contains(&handle));
            assert_eq!(buttons, &vec![views::remove_button(&handle)]);
        }
        other => panic!("expected audio reply, got {other:?}"),
    }
    assert_eq!(text_of(&replies[1]), views::already_archived());
    match &replies[2] {
        Reply::Text { text, buttons, .. } => {
            assert!(text.contains("My Title"));
            assert_eq!(buttons.len(), 1);
            assert_eq!(buttons[0].data, format!("get:{handle}"));
        }
        other => panic!("expected playlist text, got {other:?}"),
    }
}

#[tokio::test]
async fn offset_moves_past_failed_and_unsupported_updates() {
    let h = Harness::new();
    h.source.push(vec![
        message(10, "bob", "https://video.example/broken"),
        IncomingUpdate { id: 11, event: None },
        message(12, "bob", "hello there"),
        message(13, "bob", "https://video.example/2"),
    ]);

    let next = h.consumer.run_batch(3).await.expect("batch");
    assert_eq!(next, 14);
    assert_eq!(h.extractions(), 2);

    let replies = h.sink.replies();
    assert_eq!(replies.len(), 3);
    assert_eq!(text_of(&replies[0]), views::generic_failure());
    assert_eq!(text_of(&replies[1]), views::not_a_url());
    assert!(matches!(replies[2], Reply::Audio { .. }));

    // Failed extraction stores nothing
    let urls: Vec<_> = h
        .store
        .playlist("bob")
        .expect("playlist")
        .into_iter()
        .map(|a| a.url)
        .collect();
    assert_eq!(urls, vec!["https://video.example/2"]);
}

#[tokio::test]
async fn empty_batch_keeps_the_offset() {
    let h = Harness::new();
    h.source.push(Vec::new());

    assert_eq!(h.consumer.run_batch(21).await.expect("batch"), 21);
    assert!(h.sink.replies().is_empty());
}

#[tokio::test]
async fn handles_are_private_to_their_owner() {
    let h = Harness::new();
    h.source.push(vec![message(1, "alice", "https://video.example/1")]);
    h.consumer.run_batch(0).await.expect("batch");
    let handle = h.store.playlist("alice").expect("playlist")[0].uuid.clone();

    h.source.push(vec![
        callback(2, "mallory", &format!("get:{handle}")),
        callback(3, "mallory", &format!("rm:{handle}")),
        callback(4, "alice", &format!("get:{handle}")),
        callback(5, "alice", "get:no-such-handle"),
    ]);
    h.consumer.run_batch(2).await.expect("batch");

    let replies = h.sink.replies();
    assert_eq!(replies.len(), 5);
    assert_eq!(text_of(&replies[1]), views::handle_not_found());
    assert_eq!(text_of(&replies[2]), views::handle_not_found());
    match &replies[3] {
        Reply::Audio { caption, data, .. } => {
            assert_eq!(caption, &views::delivered_caption("My Title"));
            assert_eq!(data, b"ID3fake-mp3");
        }
        other => panic!("expected audio reply, got {other:?}"),
    }
    assert_eq!(text_of(&replies[4]), views::handle_not_found());

    // Mallory's attempts left the item in place
    assert!(h.store.lookup_by_handle(&handle).is_ok());
}

#[tokio::test]
async fn discard_removes_the_item_and_its_message() {
    let h = Harness::new();
    h.source.push(vec![message(1, "alice", "https://video.example/1")]);
    h.consumer.run_batch(0).await.expect("batch");
    let handle = h.store.playlist("alice").expect("playlist")[0].uuid.clone();

    h.source.push(vec![callback(2, "alice", &format!("rm:{handle}"))]);
    h.consumer.run_batch(2).await.expect("batch");

    assert_eq!(
        h.sink.replies().last(),
        Some(&Reply::Delete {
            chat_id: 42,
            message_id: 777
        })
    );
    assert!(h.store.playlist("alice").expect("playlist").is_empty());
}

#[tokio::test]
async fn delete_command_removes_by_title() {
    let h = Harness::new();
    h.source.push(vec![
        message(1, "alice", "https://video.example/1"),
        message(2, "alice", "/delete My Title"),
        message(3, "alice", "/delete My Title"),
        message(4, "alice", "/delete"),
    ]);
    h.consumer.run_batch(0).await.expect("batch");

    let replies = h.sink.replies();
    assert_eq!(text_of(&replies[1]), views::removed("My Title", 1));
    assert_eq!(text_of(&replies[2]), views::removed("My Title", 0));
    assert_eq!(text_of(&replies[3]), views::remove_usage());
    assert!(h.store.playlist("alice").expect("playlist").is_empty());
}

#[tokio::test]
async fn delivery_failures_do_not_stop_the_batch() {
    let h = Harness::with_sink(RecordingSink {
        reject: true,
        ..RecordingSink::default()
    });
    h.source.push(vec![
        message(1, "carol", "/start"),
        message(2, "carol", "https://video.example/1"),
    ]);

    assert_eq!(h.consumer.run_batch(0).await.expect("batch"), 3);
    assert_eq!(h.sink.replies().len(), 2);
    assert_eq!(h.store.playlist("carol").expect("playlist").len(), 1);
}

#[tokio::test]
async fn cancelled_consumer_stops_without_polling() {
    let h = Harness::new();
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    h.consumer.run(shutdown).await.expect("clean shutdown");
    assert!(h.source.offsets().is_empty());
}
