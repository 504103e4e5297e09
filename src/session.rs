//! One foreground session over the durable store.
//!
//! A session wires the snapshot timeline, the response cache and the
//! offline queue onto a single [`Store`], and routes chat requests through
//! them: cache first, then the assistant, then the queue when the network
//! is unreachable.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use editvault_cache::{CacheHit, CachedResponse, ResponseCache};
use editvault_core::{AssistantReply, ChatRequest};
use editvault_queue::{OfflineQueue, QueueItem, ReplayReport, ReplayTrigger, Transport};
use editvault_snapshot::{CrashRecord, RecoverySlot, SharedWorkspace, SnapshotManager, Workspace};
use editvault_store::Store;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::assistant::{Assistant, AssistantError};
use crate::config::EditvaultConfig;

/// How a chat request was answered.
#[derive(Debug)]
pub enum ChatOutcome {
    Cached(CacheHit),
    Answered(AssistantReply),
    /// The assistant was unreachable; the request waits in the offline queue.
    Queued { item: QueueItem, reason: String },
}

pub struct Session {
    store: Store,
    workspace: SharedWorkspace,
    snapshots: SnapshotManager,
    cache: ResponseCache,
    queue: OfflineQueue,
    recovery: RecoverySlot,
    assistant: Arc<dyn Assistant>,
    // opportunistic replays still running in the background
    replays: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Open every component over `store` and warm the cache.
    pub async fn open(
        store: Store,
        config: &EditvaultConfig,
        assistant: Arc<dyn Assistant>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let workspace = Workspace::new().shared();
        let snapshots = SnapshotManager::open(
            &store,
            config.snapshots.to_retention_limits(),
            workspace.clone(),
        )
        .await
        .context("Failed to open snapshot timeline")?;

        let cache = ResponseCache::open(&store, config.cache.to_cache_config()).await;
        let warmed = cache.warm_start_default().await;
        if warmed > 0 {
            tracing::debug!("Warm-started response cache with {} entries", warmed);
        }

        let queue = OfflineQueue::start(&store, config.queue.to_queue_config(), transport)
            .await
            .context("Failed to start offline queue")?;
        let recovery = RecoverySlot::open(&store)
            .await
            .context("Failed to open recovery slot")?;

        Ok(Self {
            store,
            workspace,
            snapshots,
            cache,
            queue,
            recovery,
            assistant,
            replays: Mutex::new(Vec::new()),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn workspace(&self) -> &SharedWorkspace {
        &self.workspace
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn recovery(&self) -> &RecoverySlot {
        &self.recovery
    }

    pub fn assistant(&self) -> &dyn Assistant {
        self.assistant.as_ref()
    }

    /// Replace the live workspace.
    pub async fn set_workspace(&self, workspace: Workspace) {
        *self.workspace.write().await = workspace;
    }

    /// Answer `request` from the cache, the assistant, or queue it.
    ///
    /// A successful live answer is cached and starts a replay of the
    /// offline queue in the background; the answer is returned without
    /// waiting for it. Only non-network assistant failures are returned as
    /// errors; a network failure that cannot be queued surfaces as the
    /// original network error.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome> {
        if let Some(hit) = self.cache.lookup(&request.messages, &request.context).await {
            tracing::debug!(tier = %hit.tier, hits = hit.hits, "Answered from cache");
            return Ok(ChatOutcome::Cached(hit));
        }

        match self.assistant.send(&request).await {
            Ok(reply) => {
                self.cache
                    .cache_response(
                        &request.messages,
                        &request.context,
                        CachedResponse::from(&reply),
                    )
                    .await;
                self.replay_after_success().await;
                Ok(ChatOutcome::Answered(reply))
            }
            Err(AssistantError::Network { request: descriptor, reason }) => {
                match self.queue.enqueue((*descriptor).clone()).await {
                    Ok(item) => {
                        tracing::info!(id = %item.id, "Assistant unreachable, request queued");
                        Ok(ChatOutcome::Queued { item, reason })
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not queue failed request");
                        Err(AssistantError::Network {
                            request: descriptor,
                            reason,
                        }
                        .into())
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn replay_after_success(&self) {
        let queue = self.queue.clone();
        let handle = tokio::spawn(async move {
            match queue.depth().await {
                Ok(0) => {}
                Ok(_) => match queue.replay(ReplayTrigger::ForegroundSuccess).await {
                    Ok(report) => tracing::info!(
                        delivered = report.delivered.len(),
                        remaining = report.remaining,
                        "Replayed offline queue"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Offline queue replay failed"),
                },
                Err(e) => tracing::warn!(error = %e, "Could not read offline queue depth"),
            }
        });

        let mut replays = self.replays.lock().await;
        replays.retain(|handle| !handle.is_finished());
        replays.push(handle);
    }

    /// Wait for background replays started by [`Session::chat`].
    pub async fn settle(&self) {
        let pending: Vec<_> = self.replays.lock().await.drain(..).collect();
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background replay task failed");
            }
        }
    }

    pub async fn replay(&self, trigger: ReplayTrigger) -> Result<ReplayReport> {
        Ok(self.queue.replay(trigger).await?)
    }

    /// Run `operation`; if it fails, preserve the live workspace in the
    /// recovery slot before returning the error.
    pub async fn guard<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match operation.await {
            Ok(value) => Ok(value),
            Err(e) => {
                let workspace = self.workspace.read().await.clone();
                if !workspace.is_empty() {
                    match self.recovery.capture(&workspace, format!("{:#}", e)).await {
                        Ok(_) => tracing::info!("Preserved workspace in recovery slot"),
                        Err(capture_err) => {
                            tracing::warn!(error = %capture_err, "Could not preserve workspace")
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// The preserved workspace from an earlier failed run, if any.
    pub async fn pending_recovery(&self) -> Option<CrashRecord> {
        match self.recovery.peek().await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read recovery slot");
                None
            }
        }
    }

    /// Finish background replays, then stop the queue worker.
    pub async fn close(self) {
        self.settle().await;
        self.queue.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::MockAssistant;
    use editvault_queue::{TransportError, TransportResponse};
    use editvault_core::RequestDescriptor;
    use async_trait::async_trait;

    struct DeadTransport;

    #[async_trait]
    impl Transport for DeadTransport {
        async fn send(&self, _: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
            Err(TransportError::Network("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_guard_preserves_workspace_on_failure() {
        let session = Session::open(
            Store::memory(),
            &EditvaultConfig::default(),
            Arc::new(MockAssistant::new()),
            Arc::new(DeadTransport),
        )
        .await
        .unwrap();
        session
            .set_workspace(Workspace::new().with_main("main.rs", "fn main() { todo!() }"))
            .await;

        let result: Result<()> = session
            .guard(async { Err(anyhow::anyhow!("disk on fire")) })
            .await;
        assert!(result.is_err());

        let record = session.pending_recovery().await.unwrap();
        assert!(record.reason.contains("disk on fire"));
        assert_eq!(record.workspace.main_code(), "fn main() { todo!() }");
        session.close().await;
    }

    #[tokio::test]
    async fn test_guard_leaves_slot_alone_on_success() {
        let session = Session::open(
            Store::memory(),
            &EditvaultConfig::default(),
            Arc::new(MockAssistant::new()),
            Arc::new(DeadTransport),
        )
        .await
        .unwrap();
        session
            .set_workspace(Workspace::new().with_main("main.rs", "ok"))
            .await;

        let value = session.guard(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(session.pending_recovery().await.is_none());
        session.close().await;
    }
}
