//! Core types shared by the editvault persistence components.
//!
//! This crate provides the vocabulary used across all editvault crates:
//! - Chat messages and assistant replies
//! - Replayable request descriptors
//! - A monotonic millisecond clock

mod clock;
mod message;
mod request;

pub use clock::{now_millis, MonotonicClock};
pub use message::{
    extract_code_block, last_user_text, AssistantReply, ChatMessage, ChatRequest, GenerationParams,
    OperatingMode, Role,
};
pub use request::RequestDescriptor;
