use std::sync::Arc;

use editvault_core::RequestDescriptor;
use editvault_store::Store;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::{QueueError, Result};
use crate::transport::Transport;
use crate::types::{EvictionRecord, QueueConfig, QueueEvent, QueueItem, ReplayReport, ReplayTrigger};
use crate::worker::{Command, Worker};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Cloneable handle to the offline queue worker.
#[derive(Clone)]
pub struct OfflineQueue {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<QueueEvent>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl OfflineQueue {
    /// Open the queue collections in `store` and spawn the worker.
    pub async fn start(
        store: &Store,
        config: QueueConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let config = QueueConfig {
            max_queue_size: config.max_queue_size.max(1),
            max_in_flight: config.max_in_flight.max(1),
            max_evictions: config.max_evictions,
        };

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let worker = Worker::open(store, config, transport, events.clone()).await?;

        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(worker.run(receiver));

        Ok(Self {
            commands,
            events,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }

    async fn call<T>(&self, command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| QueueError::WorkerStopped)?;
        response.await.map_err(|_| QueueError::WorkerStopped)?
    }

    /// Admit a request that failed to send, evicting the oldest queued
    /// request when the queue is full.
    pub async fn enqueue(&self, request: RequestDescriptor) -> Result<QueueItem> {
        self.call(|reply| Command::Enqueue { request, reply }).await
    }

    /// Attempt every queued request once, oldest first.
    pub async fn replay(&self, trigger: ReplayTrigger) -> Result<ReplayReport> {
        self.call(|reply| Command::Replay { trigger, reply }).await
    }

    /// Queued requests, oldest first.
    pub async fn list(&self) -> Result<Vec<QueueItem>> {
        self.call(|reply| Command::List { reply }).await
    }

    pub async fn depth(&self) -> Result<usize> {
        self.call(|reply| Command::Depth { reply }).await
    }

    /// Drop every queued request.
    pub async fn clear(&self) -> Result<usize> {
        self.call(|reply| Command::Clear { reply }).await
    }

    /// Requests dropped by capacity pressure, oldest first.
    pub async fn lost(&self) -> Result<Vec<EvictionRecord>> {
        self.call(|reply| Command::Lost { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Stop the worker and wait for it to exit. Later calls on any handle
    /// fail with [`QueueError::WorkerStopped`].
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = done.await;
        }
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}
