use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use editvault::assistant::{Assistant, AssistantError, MockAssistant};
use editvault::config::EditvaultConfig;
use editvault::session::{ChatOutcome, Session};
use editvault_cache::CacheTier;
use editvault_core::{AssistantReply, ChatMessage, ChatRequest, OperatingMode, RequestDescriptor};
use editvault_queue::{Transport, TransportError, TransportResponse};
use editvault_store::{MemoryBackend, Store};

/// Records replayed requests and always succeeds.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<RequestDescriptor>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        Ok(TransportResponse {
            status: 200,
            body: r#"{"content":"late answer"}"#.to_string(),
        })
    }
}

/// Holds every replayed request until released.
#[derive(Default)]
struct GatedTransport {
    gate: tokio::sync::Notify,
    sent: Mutex<usize>,
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, _: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
        self.gate.notified().await;
        *self.sent.lock().unwrap() += 1;
        Ok(TransportResponse {
            status: 200,
            body: "{}".to_string(),
        })
    }
}

struct BrokenAssistant;

#[async_trait]
impl Assistant for BrokenAssistant {
    async fn send(&self, _: &ChatRequest) -> Result<AssistantReply, AssistantError> {
        Err(AssistantError::Upstream {
            status: 500,
            body: "internal error".to_string(),
        })
    }

    fn mode(&self) -> OperatingMode {
        OperatingMode::Production
    }
}

fn question(text: &str) -> ChatRequest {
    ChatRequest::new(
        vec![ChatMessage::user(text)],
        "fn add(a: i32, b: i32) -> i32 { a - b }",
    )
}

async fn open(
    store: Store,
    config: &EditvaultConfig,
    assistant: Arc<dyn Assistant>,
    transport: Arc<dyn Transport>,
) -> Session {
    Session::open(store, config, assistant, transport).await.unwrap()
}

#[tokio::test]
async fn test_second_identical_chat_is_a_cache_hit() {
    let mock = Arc::new(MockAssistant::new());
    let session = open(
        Store::memory(),
        &EditvaultConfig::default(),
        mock.clone(),
        Arc::new(RecordingTransport::default()),
    )
    .await;

    assert_eq!(session.cache().stats().await.counts.hits, 0);

    let first = session.chat(question("Why does add subtract?")).await.unwrap();
    let answer = match first {
        ChatOutcome::Answered(reply) => reply.content,
        other => panic!("expected a live answer, got {:?}", other),
    };
    assert_eq!(session.cache().stats().await.counts.hits, 0);

    let second = session.chat(question("Why does add subtract?")).await.unwrap();
    match second {
        ChatOutcome::Cached(hit) => {
            assert_eq!(hit.tier, CacheTier::Memory);
            assert_eq!(hit.hits, 1);
            assert_eq!(hit.response.content, answer);
        }
        other => panic!("expected a cache hit, got {:?}", other),
    }
    assert_eq!(session.cache().stats().await.counts.hits, 1);
    assert_eq!(mock.calls(), 1);

    session.close().await;
}

#[tokio::test]
async fn test_offline_chat_is_queued_and_replayed_after_success() {
    let mock = Arc::new(MockAssistant::new());
    let transport = Arc::new(RecordingTransport::default());
    let session = open(
        Store::memory(),
        &EditvaultConfig::default(),
        mock.clone(),
        transport.clone(),
    )
    .await;

    mock.set_offline(true);
    let queued = session.chat(question("first, while offline")).await.unwrap();
    let queued_id = match queued {
        ChatOutcome::Queued { item, .. } => {
            assert_eq!(item.request.url, MockAssistant::ENDPOINT);
            item.id
        }
        other => panic!("expected the request to be queued, got {:?}", other),
    };
    assert_eq!(session.queue().depth().await.unwrap(), 1);

    mock.set_offline(false);
    let answered = session.chat(question("second, back online")).await.unwrap();
    assert!(matches!(answered, ChatOutcome::Answered(_)));

    // the live success drained the queue in the background
    session.settle().await;
    assert_eq!(session.queue().depth().await.unwrap(), 0);
    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.as_deref().unwrap().contains("first, while offline"));
    assert!(!queued_id.is_empty());

    session.close().await;
}

#[tokio::test]
async fn test_disabled_cache_always_asks_the_assistant() {
    let mut config = EditvaultConfig::default();
    config.cache.enabled = false;
    let mock = Arc::new(MockAssistant::new());
    let session = open(
        Store::memory(),
        &config,
        mock.clone(),
        Arc::new(RecordingTransport::default()),
    )
    .await;

    for _ in 0..2 {
        let outcome = session.chat(question("same question")).await.unwrap();
        assert!(matches!(outcome, ChatOutcome::Answered(_)));
    }
    assert_eq!(mock.calls(), 2);

    session.close().await;
}

#[tokio::test]
async fn test_upstream_errors_are_not_queued() {
    let session = open(
        Store::memory(),
        &EditvaultConfig::default(),
        Arc::new(BrokenAssistant),
        Arc::new(RecordingTransport::default()),
    )
    .await;

    let err = session.chat(question("anything")).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AssistantError>(),
        Some(AssistantError::Upstream { status: 500, .. })
    ));
    assert_eq!(session.queue().depth().await.unwrap(), 0);

    session.close().await;
}

#[tokio::test]
async fn test_unqueueable_request_surfaces_the_network_error() {
    let backend = Arc::new(MemoryBackend::new());
    let mock = Arc::new(MockAssistant::new());
    let session = open(
        Store::with_backend(backend.clone()),
        &EditvaultConfig::default(),
        mock.clone(),
        Arc::new(RecordingTransport::default()),
    )
    .await;

    mock.set_offline(true);
    backend.set_fail_writes(true);

    let err = session.chat(question("lost cause")).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AssistantError>(),
        Some(AssistantError::Network { .. })
    ));

    backend.set_fail_writes(false);
    session.close().await;
}

#[tokio::test]
async fn test_cached_answers_survive_a_restart() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = EditvaultConfig::default();

    {
        let store = Store::open(temp_dir.path()).await.unwrap();
        let session = open(
            store,
            &config,
            Arc::new(MockAssistant::new()),
            Arc::new(RecordingTransport::default()),
        )
        .await;
        session.chat(question("remember me")).await.unwrap();
        session.close().await;
    }

    let store = Store::open(temp_dir.path()).await.unwrap();
    let mock = Arc::new(MockAssistant::new());
    let session = open(
        store,
        &config,
        mock.clone(),
        Arc::new(RecordingTransport::default()),
    )
    .await;

    // warm start already pulled the entry into memory
    match session.chat(question("remember me")).await.unwrap() {
        ChatOutcome::Cached(hit) => assert_eq!(hit.tier, CacheTier::Memory),
        other => panic!("expected a cache hit, got {:?}", other),
    }
    assert_eq!(mock.calls(), 0);

    session.close().await;
}

#[tokio::test]
async fn test_live_answer_does_not_wait_for_replay() {
    let mock = Arc::new(MockAssistant::new());
    let transport = Arc::new(GatedTransport::default());
    let session = open(
        Store::memory(),
        &EditvaultConfig::default(),
        mock.clone(),
        transport.clone(),
    )
    .await;

    mock.set_offline(true);
    session.chat(question("stuck while offline")).await.unwrap();
    mock.set_offline(false);

    // the replay blocks on the gate, the answer must not
    let answered = tokio::time::timeout(
        Duration::from_secs(5),
        session.chat(question("answer me now")),
    )
    .await
    .expect("chat waited for the background replay")
    .unwrap();
    assert!(matches!(answered, ChatOutcome::Answered(_)));
    assert_eq!(*transport.sent.lock().unwrap(), 0);

    transport.gate.notify_one();
    session.settle().await;
    assert_eq!(*transport.sent.lock().unwrap(), 1);
    assert_eq!(session.queue().depth().await.unwrap(), 0);

    session.close().await;
}
