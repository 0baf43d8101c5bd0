//! Terminal rendering of streamed answers

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use insights_core::{
    Attachment, MessageRole, MessageStore, SessionId, SessionUpdate, Source, StreamConsumer,
};
use serde_json::{Map, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;

/// Print a session's answer as it streams
///
/// When `interrupt` resolves the session is cancelled and its partial answer
/// finished off. Returns once the session has ended.
pub async fn follow<W, I>(
    consumer: &StreamConsumer,
    updates: &mut UnboundedReceiver<SessionUpdate>,
    session_id: &SessionId,
    out: &mut W,
    interrupt: I,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    I: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    let mut interrupted = false;
    let mut printed = 0usize;

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                if update.session_id() != Some(session_id) {
                    continue;
                }
                match update {
                    SessionUpdate::Chunk { text, .. } => {
                        out.write_all(text.as_bytes()).await?;
                        out.flush().await?;
                        printed += text.len();
                    }
                    SessionUpdate::Completed { .. } => {
                        out.write_all(b"\n").await?;
                        break;
                    }
                    SessionUpdate::Errored { visible_answer, .. } => {
                        if printed > 0 {
                            out.write_all(b"\n").await?;
                        }
                        out.write_all(format!("{visible_answer}\n").as_bytes()).await?;
                        break;
                    }
                    SessionUpdate::Cancelled { partial, .. } => {
                        let marker = partial.get(printed..).unwrap_or_default();
                        out.write_all(format!("{marker}\n").as_bytes()).await?;
                        break;
                    }
                    _ => {}
                }
            }
            () = &mut interrupt, if !interrupted => {
                interrupted = true;
                if consumer.cancel() {
                    tracing::debug!(session_id = %session_id, "Cancelled from terminal");
                }
            }
        }
    }

    out.flush().await?;
    Ok(())
}

/// Resolves on Ctrl-C; never, if the handler cannot be installed
pub async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
}

/// "Sources:" listing of retrieval metadata, if it has any
pub fn sources_block(metadata: &Map<String, Value>) -> Option<String> {
    let sources = Source::from_metadata(metadata);
    if sources.is_empty() {
        return None;
    }

    let mut block = String::from("Sources:\n");
    for source in sources {
        block.push_str(&format!("  - {source}\n"));
    }
    Some(block)
}

/// The conversation so far, one message per paragraph
pub fn format_history(store: &MessageStore) -> String {
    let messages = store.conversation();
    if messages.is_empty() {
        return "No messages yet.\n".to_string();
    }

    let mut history = String::new();
    for message in messages {
        let who = match message.role {
            MessageRole::User => "You",
            MessageRole::Assistant => "AI",
        };
        history.push_str(&format!("{who}: {}\n", message.content));
        if let Some(mime) = message.attachment.as_ref().and_then(Attachment::mime_type) {
            history.push_str(&format!("     [{mime} attached]\n"));
        }
        history.push('\n');
    }
    history
}

/// MIME type of an image file, by extension
pub fn mime_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Read an image into a data-URL attachment
pub async fn load_attachment(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image: {}", path.display()))?;
    Ok(Attachment::from_bytes(mime_for(path), &bytes))
}
