pub mod assistant;
pub mod cli;
pub mod config;
pub mod session;

// Re-export core types for convenience
pub use editvault_core::{AssistantReply, ChatMessage, ChatRequest, OperatingMode, RequestDescriptor};
