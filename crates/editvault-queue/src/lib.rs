//! Offline request queue.
//!
//! Requests that fail for lack of connectivity are stored durably and
//! replayed later. The queue is bounded: when full, the oldest request is
//! dropped and recorded so it can be reported as lost.
//!
//! A background worker task owns the queue; callers talk to it through the
//! cloneable [`OfflineQueue`] handle and can watch [`QueueEvent`]s.

mod error;
mod queue;
mod transport;
mod types;
mod worker;

pub use error::{QueueError, Result};
pub use queue::OfflineQueue;
pub use transport::{Transport, TransportError, TransportResponse};
pub use types::{EvictionRecord, QueueConfig, QueueEvent, QueueItem, ReplayReport, ReplayTrigger};
