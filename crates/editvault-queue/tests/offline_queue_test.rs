use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use editvault_core::RequestDescriptor;
use editvault_queue::{
    OfflineQueue, QueueConfig, QueueError, QueueEvent, ReplayTrigger, Transport, TransportError,
    TransportResponse,
};
use editvault_store::{Backend, MemoryBackend, Store};
use tempfile::TempDir;

#[derive(Default)]
struct FakeTransport {
    online: AtomicBool,
    failing_urls: Mutex<HashSet<String>>,
    sent: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeTransport {
    fn offline() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slow(delay: Duration) -> Arc<Self> {
        let transport = Self {
            delay: Some(delay),
            ..Self::default()
        };
        transport.online.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn fail_url(&self, url: &str) {
        self.failing_urls.lock().unwrap().insert(url.to_string());
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
        self.sent.lock().unwrap().push(request.url.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::Network("offline".to_string()));
        }
        if self.failing_urls.lock().unwrap().contains(&request.url) {
            return Err(TransportError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(TransportResponse {
            status: 200,
            body: "{}".to_string(),
        })
    }
}

fn request(n: usize) -> RequestDescriptor {
    RequestDescriptor::post_json(
        format!("http://assistant.local/chat/{}", n),
        &serde_json::json!({ "n": n }),
    )
}

fn config(max_queue_size: usize) -> QueueConfig {
    QueueConfig {
        max_queue_size,
        ..QueueConfig::default()
    }
}

#[tokio::test]
async fn test_overflow_drops_oldest_request() {
    let store = Store::memory();
    let queue = OfflineQueue::start(&store, config(10), FakeTransport::offline())
        .await
        .unwrap();

    for n in 1..=11 {
        queue.enqueue(request(n)).await.unwrap();
    }

    let urls: Vec<String> = queue
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.request.url)
        .collect();
    let expected: Vec<String> = (2..=11)
        .map(|n| format!("http://assistant.local/chat/{}", n))
        .collect();
    assert_eq!(urls, expected);
    assert_eq!(queue.depth().await.unwrap(), 10);

    let lost = queue.lost().await.unwrap();
    assert_eq!(lost.len(), 1);
    assert_eq!(lost[0].url, "http://assistant.local/chat/1");
    assert_eq!(lost[0].method, "POST");
}

#[tokio::test]
async fn test_eviction_is_announced_before_admission() {
    let store = Store::memory();
    let queue = OfflineQueue::start(&store, config(1), FakeTransport::offline())
        .await
        .unwrap();
    let first = queue.enqueue(request(1)).await.unwrap();

    let mut events = queue.subscribe();
    let second = queue.enqueue(request(2)).await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        QueueEvent::Evicted {
            id: first.id,
            url: "http://assistant.local/chat/1".to_string()
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        QueueEvent::Queued {
            id: second.id,
            depth: 1
        }
    );
}

#[tokio::test]
async fn test_replay_keeps_failures_and_removes_deliveries() {
    let store = Store::memory();
    let transport = FakeTransport::offline();
    let queue = OfflineQueue::start(&store, config(10), transport.clone())
        .await
        .unwrap();
    for n in 1..=3 {
        queue.enqueue(request(n)).await.unwrap();
    }

    let report = queue.replay(ReplayTrigger::UserRetry).await.unwrap();
    assert_eq!(report.attempted, 3);
    assert!(report.delivered.is_empty());
    assert_eq!(report.remaining, 3);
    assert!(queue.list().await.unwrap().iter().all(|item| item.attempts == 1));

    transport.set_online(true);
    transport.fail_url("http://assistant.local/chat/2");
    let mut events = queue.subscribe();

    let report = queue.replay(ReplayTrigger::ConnectivityRestored).await.unwrap();
    assert_eq!(report.trigger, ReplayTrigger::ConnectivityRestored);
    assert_eq!(report.delivered.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.remaining, 1);

    let left = queue.list().await.unwrap();
    assert_eq!(left[0].request.url, "http://assistant.local/chat/2");
    assert_eq!(left[0].attempts, 2);
    assert!(left[0].last_error.as_deref().unwrap_or_default().contains("503"));

    let mut delivered = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, QueueEvent::Delivered { .. }) {
            delivered += 1;
        }
    }
    assert_eq!(delivered, 2);
}

#[tokio::test]
async fn test_replay_is_oldest_first_and_bounded() {
    let store = Store::memory();
    let transport = FakeTransport::slow(Duration::from_millis(20));
    let queue = OfflineQueue::start(
        &store,
        QueueConfig {
            max_queue_size: 10,
            max_in_flight: 2,
            ..QueueConfig::default()
        },
        transport.clone(),
    )
    .await
    .unwrap();
    for n in 1..=6 {
        queue.enqueue(request(n)).await.unwrap();
    }

    let report = queue.replay(ReplayTrigger::ForegroundSuccess).await.unwrap();
    assert_eq!(report.delivered.len(), 6);
    assert_eq!(report.remaining, 0);
    assert!(transport.peak_in_flight.load(Ordering::SeqCst) <= 2);

    // the first two requests start before any later one
    let sent = transport.sent();
    let first_two: HashSet<&str> = sent[..2].iter().map(String::as_str).collect();
    assert!(first_two.contains("http://assistant.local/chat/1"));
    assert!(first_two.contains("http://assistant.local/chat/2"));
}

#[tokio::test]
async fn test_empty_replay() {
    let store = Store::memory();
    let queue = OfflineQueue::start(&store, QueueConfig::default(), FakeTransport::offline())
        .await
        .unwrap();

    let report = queue.replay(ReplayTrigger::UserRetry).await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(report.remaining, 0);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let first_ids: Vec<String> = {
        let store = Store::open(temp_dir.path()).await.unwrap();
        let queue = OfflineQueue::start(&store, config(10), FakeTransport::offline())
            .await
            .unwrap();
        let mut ids = Vec::new();
        for n in 1..=3 {
            ids.push(queue.enqueue(request(n)).await.unwrap().id);
        }
        queue.shutdown().await;
        ids
    };

    let store = Store::open(temp_dir.path()).await.unwrap();
    let queue = OfflineQueue::start(&store, config(10), FakeTransport::offline())
        .await
        .unwrap();
    let next = queue.enqueue(request(4)).await.unwrap();

    let items = queue.list().await.unwrap();
    assert_eq!(items.len(), 4);
    assert_eq!(
        items.iter().take(3).map(|i| i.id.clone()).collect::<Vec<_>>(),
        first_ids
    );
    assert!(next.id > first_ids[2]);
    assert_eq!(items[0].request, request(1));
}

#[tokio::test]
async fn test_clear_and_shutdown() {
    let store = Store::memory();
    let queue = OfflineQueue::start(&store, config(10), FakeTransport::offline())
        .await
        .unwrap();
    queue.enqueue(request(1)).await.unwrap();
    queue.enqueue(request(2)).await.unwrap();

    assert_eq!(queue.clear().await.unwrap(), 2);
    assert_eq!(queue.depth().await.unwrap(), 0);

    let handle = queue.clone();
    queue.shutdown().await;
    assert!(matches!(
        handle.enqueue(request(3)).await,
        Err(QueueError::WorkerStopped)
    ));
}

#[tokio::test]
async fn test_corrupt_item_does_not_block_replay() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Store::with_backend(backend.clone());
    let transport = FakeTransport::offline();
    let queue = OfflineQueue::start(&store, config(10), transport.clone())
        .await
        .unwrap();
    let broken = queue.enqueue(request(1)).await.unwrap();
    let healthy = queue.enqueue(request(2)).await.unwrap();
    backend
        .write("offline_queue", &broken.id, b"{\"kind\": 1}".to_vec())
        .await
        .unwrap();

    transport.set_online(true);
    let report = queue.replay(ReplayTrigger::UserRetry).await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.delivered, vec![healthy.id]);
    assert_eq!(report.unreadable, vec![broken.id.clone()]);
    assert_eq!(report.remaining, 1);
    assert_eq!(transport.sent(), vec!["http://assistant.local/chat/2".to_string()]);

    // later passes keep working too
    queue.enqueue(request(3)).await.unwrap();
    let report = queue.replay(ReplayTrigger::ConnectivityRestored).await.unwrap();
    assert_eq!(report.delivered.len(), 1);
    assert!(queue.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_storage_error_during_bookkeeping_keeps_the_pass_going() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Store::with_backend(backend.clone());
    let transport = FakeTransport::offline();
    let queue = OfflineQueue::start(&store, config(10), transport.clone())
        .await
        .unwrap();
    for n in 1..=2 {
        queue.enqueue(request(n)).await.unwrap();
    }

    // attempt counters cannot be written back, but every item is still tried
    backend.set_fail_writes(true);
    let report = queue.replay(ReplayTrigger::UserRetry).await.unwrap();
    backend.set_fail_writes(false);

    assert_eq!(report.attempted, 2);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.remaining, 2);
    assert_eq!(transport.sent().len(), 2);
}
