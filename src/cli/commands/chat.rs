use anyhow::Result;
use editvault_core::{ChatMessage, ChatRequest};

use crate::session::{ChatOutcome, Session};

pub async fn handle_chat_command(
    message: &str,
    context: &str,
    system: Option<&str>,
    session: &Session,
) -> Result<()> {
    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(message));

    match session.chat(ChatRequest::new(messages, context)).await? {
        ChatOutcome::Cached(hit) => {
            println!("{}", hit.response.content);
            eprintln!("\n(cached: {} tier, {} hits)", hit.tier, hit.hits);
        }
        ChatOutcome::Answered(reply) => {
            println!("{}", reply.content);
            match reply.tokens {
                Some(tokens) => eprintln!("\n({}, {} tokens)", reply.mode, tokens),
                None => eprintln!("\n({})", reply.mode),
            }
        }
        ChatOutcome::Queued { item, reason } => {
            eprintln!("📡 Assistant unreachable: {}", reason);
            eprintln!("   Request queued as {}; run `editvault queue replay` once online", item.id);
        }
    }

    Ok(())
}
