//! Background task that owns the queue collections.

use std::sync::Arc;

use editvault_core::{now_millis, RequestDescriptor};
use editvault_store::{Collection, Direction, Store};
use futures::stream::{self, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::transport::Transport;
use crate::types::{
    EvictionRecord, IdGenerator, QueueConfig, QueueEvent, QueueItem, ReplayReport, ReplayTrigger,
};

pub(crate) const QUEUE_COLLECTION: &str = "offline_queue";
pub(crate) const EVICTION_COLLECTION: &str = "queue_evictions";

pub(crate) enum Command {
    Enqueue {
        request: RequestDescriptor,
        reply: oneshot::Sender<Result<QueueItem>>,
    },
    Replay {
        trigger: ReplayTrigger,
        reply: oneshot::Sender<Result<ReplayReport>>,
    },
    List {
        reply: oneshot::Sender<Result<Vec<QueueItem>>>,
    },
    Depth {
        reply: oneshot::Sender<Result<usize>>,
    },
    Clear {
        reply: oneshot::Sender<Result<usize>>,
    },
    Lost {
        reply: oneshot::Sender<Result<Vec<EvictionRecord>>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct Worker {
    items: Collection<QueueItem>,
    evictions: Collection<EvictionRecord>,
    transport: Arc<dyn Transport>,
    config: QueueConfig,
    events: broadcast::Sender<QueueEvent>,
    ids: IdGenerator,
}

impl Worker {
    pub(crate) async fn open(
        store: &Store,
        config: QueueConfig,
        transport: Arc<dyn Transport>,
        events: broadcast::Sender<QueueEvent>,
    ) -> Result<Self> {
        let items = store.collection::<QueueItem>(QUEUE_COLLECTION).await?;
        let evictions = store.collection::<EvictionRecord>(EVICTION_COLLECTION).await?;

        let keys = items.keys().await?;
        let ids = IdGenerator::resume_after(keys.last().map(String::as_str));
        debug!("Offline queue opened with {} pending requests", keys.len());

        Ok(Self {
            items,
            evictions,
            transport,
            config,
            events,
            ids,
        })
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Enqueue { request, reply } => {
                    let _ = reply.send(self.enqueue(request).await);
                }
                Command::Replay { trigger, reply } => {
                    let _ = reply.send(self.replay(trigger).await);
                }
                Command::List { reply } => {
                    let _ = reply.send(self.list().await);
                }
                Command::Depth { reply } => {
                    let _ = reply.send(self.items.count().await.map_err(Into::into));
                }
                Command::Clear { reply } => {
                    let _ = reply.send(self.items.clear().await.map_err(Into::into));
                }
                Command::Lost { reply } => {
                    let _ = reply.send(self.lost().await);
                }
                Command::Shutdown { reply } => {
                    debug!("Offline queue worker shutting down");
                    let _ = reply.send(());
                    return;
                }
            }
        }
        debug!("Offline queue handles dropped, worker exiting");
    }

    fn publish(&self, event: QueueEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn enqueue(&mut self, request: RequestDescriptor) -> Result<QueueItem> {
        let mut keys = self.items.keys().await?;

        // drop-oldest until there is room for one more
        let max = self.config.max_queue_size;
        while keys.len() >= max {
            let oldest = keys.remove(0);
            self.evict(&oldest).await?;
        }

        let (id, timestamp) = self.ids.next(now_millis());
        let item = QueueItem {
            id,
            timestamp,
            request,
            attempts: 0,
            last_error: None,
        };
        self.items.put(&item).await?;

        let depth = keys.len() + 1;
        info!(id = %item.id, url = %item.request.url, depth, "Queued request for replay");
        self.publish(QueueEvent::Queued {
            id: item.id.clone(),
            depth,
        });
        Ok(item)
    }

    async fn evict(&self, id: &str) -> Result<()> {
        let item = match self.items.get(id).await {
            Ok(Some(item)) => item,
            Ok(None) => return Ok(()),
            Err(e) if !e.is_unavailable() => {
                // undecodable, so there is nothing to put in the ledger
                warn!(id, error = %e, "Queue full, dropped unreadable request");
                self.items.delete(id).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.items.delete(id).await?;

        let record = EvictionRecord::for_item(&item, now_millis());
        if let Err(e) = self.evictions.put(&record).await {
            warn!(id, error = %e, "Failed to record evicted request");
        }
        self.trim_evictions().await;

        warn!(id, url = %item.request.url, "Queue full, dropped oldest request");
        self.publish(QueueEvent::Evicted {
            id: item.id,
            url: item.request.url,
        });
        Ok(())
    }

    async fn trim_evictions(&self) {
        let keys = match self.evictions.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list eviction records");
                return;
            }
        };

        let excess = keys.len().saturating_sub(self.config.max_evictions);
        for key in keys.iter().take(excess) {
            if let Err(e) = self.evictions.delete(key).await {
                warn!(id = %key, error = %e, "Failed to trim eviction record");
            }
        }
    }

    async fn replay(&mut self, trigger: ReplayTrigger) -> Result<ReplayReport> {
        let listing = self.items.get_all_lossy(None, Direction::Ascending).await?;
        let pending = listing.records;
        let unreadable = listing.unreadable;
        for id in &unreadable {
            warn!(id = %id, "Skipping unreadable queued request");
        }

        let attempted = pending.len();
        if attempted > 0 {
            info!(%trigger, pending = attempted, "Replaying offline queue");
        }

        let transport = Arc::clone(&self.transport);
        let outcomes: Vec<_> = stream::iter(pending)
            .map(|item| {
                let transport = Arc::clone(&transport);
                async move {
                    let result = transport.send(&item.request).await;
                    (item, result)
                }
            })
            .buffer_unordered(self.config.max_in_flight.max(1))
            .collect()
            .await;

        // bookkeeping is per item; a storage error on one must not lose the rest
        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (mut item, result) in outcomes {
            match result {
                Ok(response) => {
                    if let Err(e) = self.items.delete(&item.id).await {
                        warn!(id = %item.id, error = %e, "Delivered request could not be removed and may be sent again");
                    }
                    debug!(id = %item.id, status = response.status, "Replayed request delivered");
                    self.publish(QueueEvent::Delivered {
                        id: item.id.clone(),
                    });
                    delivered.push(item.id);
                }
                Err(e) => {
                    item.attempts += 1;
                    item.last_error = Some(e.to_string());
                    debug!(id = %item.id, attempts = item.attempts, error = %e, "Replay failed, keeping request");
                    if let Err(e) = self.items.put(&item).await {
                        warn!(id = %item.id, error = %e, "Failed to record replay attempt");
                    }
                    failed.push(item.id);
                }
            }
        }

        // buffer_unordered completes out of order
        delivered.sort();
        failed.sort();

        let remaining = match self.items.count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to count queue after replay");
                failed.len() + unreadable.len()
            }
        };
        Ok(ReplayReport {
            trigger,
            attempted,
            delivered,
            failed,
            unreadable,
            remaining,
        })
    }

    async fn list(&self) -> Result<Vec<QueueItem>> {
        let listing = self.items.get_all_lossy(None, Direction::Ascending).await?;
        Ok(listing.records)
    }

    async fn lost(&self) -> Result<Vec<EvictionRecord>> {
        Ok(self.evictions.get_all(None, Direction::Ascending).await?)
    }
}
