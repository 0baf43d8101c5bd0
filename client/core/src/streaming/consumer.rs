//! Stream Consumer
//!
//! Owns the single outstanding request of one conversation surface. Bytes from
//! the transport go through the [`SseDecoder`], become [`StreamEvent`]s and
//! are folded into a [`StreamSession`]; every resulting change is pushed to
//! subscribers as a [`SessionUpdate`].
//!
//! # Concurrency
//!
//! Session state sits behind one `parking_lot::Mutex`. The read loop of each
//! session runs on its own tokio task and re-checks, under that lock, that its
//! session is still the active one before applying anything. Bytes that arrive
//! for a cancelled or failed session are dropped and never reach the session
//! that follows it.
//!
//! Updates are sent while the state lock is held so subscribers see them in
//! exactly the order the state changed.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::decoder::{data_payload, SseDecoder};
use super::event::StreamEvent;
use crate::backend::{StreamRequest, Transport, TransportError};
use crate::cache::{QueryCache, QueryKey};
use crate::config::ClientConfig;
use crate::messages::{Attachment, SessionId, SessionUpdate};
use crate::session::{
    SessionFailure, SessionSnapshot, SessionStatus, StreamSession, DEFAULT_CANCEL_MARKER,
};
use crate::store::{Exchange, MessageStore};

/// Consumer settings
#[derive(Clone, Debug)]
pub struct ConsumerConfig {
    /// Appended to the partial answer on cancel
    pub cancel_marker: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            cancel_marker: DEFAULT_CANCEL_MARKER.to_string(),
        }
    }
}

impl From<&ClientConfig> for ConsumerConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            cancel_marker: config.cancel_marker.clone(),
        }
    }
}

/// Why a question was not accepted
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StartError {
    /// Nothing but whitespace was submitted
    #[error("Question is empty")]
    EmptyQuestion,

    /// Another answer is still streaming
    #[error("Session {0} is still active")]
    SessionActive(SessionId),
}

/// How a driven session ended, as seen by its read loop
#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    /// The answer was committed
    Completed(Exchange),
    /// The session failed
    Errored {
        /// Failure description
        message: String,
    },
    /// The user cancelled
    Cancelled {
        /// Partial answer including the cancellation marker
        partial: String,
    },
    /// The outcome is no longer known (the task panicked, or later sessions
    /// have already ended)
    Detached,
}

/// Handle to a session started with [`StreamConsumer::start`]
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    join: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    /// ID of the started session
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Wait for the read loop to finish
    pub async fn wait(self) -> SessionOutcome {
        self.join.await.unwrap_or_else(|e| {
            tracing::error!(session_id = %self.id, error = %e, "Session task failed");
            SessionOutcome::Detached
        })
    }
}

struct ConsumerState {
    session: StreamSession,
    decoder: SseDecoder,
    /// Signals the read loop of the active session to stop
    abort: Option<watch::Sender<bool>>,
    /// Outcome of the most recently ended session
    last_outcome: Option<(SessionId, SessionOutcome)>,
}

struct Shared {
    state: Mutex<ConsumerState>,
    observers: Mutex<Vec<mpsc::UnboundedSender<SessionUpdate>>>,
}

/// Streaming answer consumer for one conversation surface
#[derive(Clone)]
pub struct StreamConsumer {
    transport: Arc<dyn Transport>,
    store: Arc<MessageStore>,
    cache: Option<(Arc<QueryCache>, QueryKey)>,
    config: ConsumerConfig,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for StreamConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConsumer")
            .field("transport", &self.transport.name())
            .field("status", &self.status())
            .field("exchanges", &self.store.len())
            .finish()
    }
}

impl StreamConsumer {
    /// Create a consumer committing exchanges to `store`
    pub fn new(transport: Arc<dyn Transport>, store: Arc<MessageStore>) -> Self {
        Self {
            transport,
            store,
            cache: None,
            config: ConsumerConfig::default(),
            shared: Arc::new(Shared {
                state: Mutex::new(ConsumerState {
                    session: StreamSession::new(),
                    decoder: SseDecoder::new(),
                    abort: None,
                    last_outcome: None,
                }),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Use custom settings
    #[must_use]
    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// Invalidate `key` in `cache` whenever an exchange is committed
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<QueryCache>, key: QueryKey) -> Self {
        self.cache = Some((cache, key));
        self
    }

    /// Receive every future update, in order
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.observers.lock().push(tx);
        rx
    }

    /// Current session state
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.state.lock().session.snapshot()
    }

    /// Current session status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.shared.state.lock().session.status()
    }

    /// Whether an answer is in flight (submission disabled)
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.state.lock().session.is_active()
    }

    /// The store exchanges are committed to
    #[must_use]
    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Submit a question and stream its answer on a new task
    ///
    /// The session is Active (and `Started` has been sent) before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] if the question is empty or another session is
    /// still active.
    pub fn start(
        &self,
        question: impl Into<String>,
        attachment: Option<Attachment>,
        request: StreamRequest,
    ) -> Result<SessionHandle, StartError> {
        let (id, abort) = self.activate(question.into(), attachment)?;

        let consumer = self.clone();
        let session_id = id.clone();
        let join = tokio::spawn(async move { consumer.drive(session_id, request, abort).await });

        Ok(SessionHandle { id, join })
    }

    /// Activate a session without a transport
    ///
    /// For surfaces that read the body themselves and feed it through
    /// [`on_bytes`](Self::on_bytes) and [`finish`](Self::finish).
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn begin(
        &self,
        question: impl Into<String>,
        attachment: Option<Attachment>,
    ) -> Result<SessionId, StartError> {
        self.activate(question.into(), attachment).map(|(id, _)| id)
    }

    /// Feed raw body bytes to the active session
    pub fn on_bytes(&self, raw: &[u8]) {
        if self.with_active(None, |this, state| this.feed_locked(state, raw)).is_none() {
            tracing::warn!(len = raw.len(), "Bytes received with no active session");
        }
    }

    /// Apply one event to the active session
    pub fn apply_event(&self, event: StreamEvent) {
        let mut state = self.shared.state.lock();
        self.apply_event_locked(&mut state, event);
    }

    /// The body ended; commit the answer unless an end event already did
    pub fn finish(&self) {
        self.with_active(None, |this, state| this.finish_locked(state));
    }

    /// The transport failed; mark the active session as errored
    pub fn fail(&self, error: &TransportError) {
        self.with_active(None, |this, state| this.fail_locked(state, error));
    }

    /// Commit the active session's answer now
    ///
    /// Returns the committed exchange, or `None` if nothing was active.
    pub fn finalize(&self) -> Option<Exchange> {
        let mut state = self.shared.state.lock();
        self.finalize_locked(&mut state)
    }

    /// Cancel the active session, keeping its partial answer
    ///
    /// Returns `false` (and changes nothing) unless a session was active.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.state.lock();
        let Some(id) = state.session.id().cloned() else {
            return false;
        };
        if !state.session.cancel(&self.config.cancel_marker) {
            return false;
        }

        let partial = state.session.accumulated_text().to_string();
        tracing::info!(
            session_id = %id,
            chars = partial.len(),
            elapsed_ms = state.session.elapsed().as_millis(),
            "Session cancelled"
        );
        Self::release(&mut state);
        state.last_outcome = Some((
            id.clone(),
            SessionOutcome::Cancelled {
                partial: partial.clone(),
            },
        ));
        self.notify(SessionUpdate::Cancelled {
            session_id: id,
            partial,
        });
        true
    }

    /// Return a cancelled or errored session to idle
    pub fn reset(&self) -> bool {
        let mut state = self.shared.state.lock();
        self.reset_locked(&mut state)
    }

    // =========================================================================
    // Read loop
    // =========================================================================

    async fn drive(
        self,
        id: SessionId,
        request: StreamRequest,
        mut abort: watch::Receiver<bool>,
    ) -> SessionOutcome {
        tracing::debug!(
            session_id = %id,
            transport = self.transport.name(),
            path = %request.path,
            "Driving session"
        );

        let opened = tokio::select! {
            biased;
            _ = abort.changed() => None,
            opened = self.transport.open(&request) => Some(opened),
        };

        let mut body = match opened {
            Some(Ok(body)) => body,
            Some(Err(e)) => {
                self.with_active(Some(&id), |this, state| this.fail_locked(state, &e));
                return self.outcome(&id);
            }
            None => return self.outcome(&id),
        };

        let mut chunks = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = abort.changed() => break,
                next = body.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    chunks += 1;
                    let still_active = self
                        .with_active(Some(&id), |this, state| {
                            this.feed_locked(state, &bytes);
                            state.session.is_active()
                        })
                        .unwrap_or(false);
                    if !still_active {
                        break;
                    }
                }
                Some(Err(e)) => {
                    self.with_active(Some(&id), |this, state| this.fail_locked(state, &e));
                    break;
                }
                None => {
                    self.with_active(Some(&id), |this, state| this.finish_locked(state));
                    break;
                }
            }
        }

        // Dropping the body closes the connection
        drop(body);
        tracing::debug!(session_id = %id, chunks, "Read loop stopped");
        self.outcome(&id)
    }

    fn outcome(&self, id: &SessionId) -> SessionOutcome {
        match &self.shared.state.lock().last_outcome {
            Some((ended, outcome)) if ended == id => outcome.clone(),
            _ => SessionOutcome::Detached,
        }
    }

    // =========================================================================
    // Locked transitions
    // =========================================================================

    fn activate(
        &self,
        question: String,
        attachment: Option<Attachment>,
    ) -> Result<(SessionId, watch::Receiver<bool>), StartError> {
        if question.trim().is_empty() {
            return Err(StartError::EmptyQuestion);
        }

        let mut state = self.shared.state.lock();
        if state.session.is_active() {
            if let Some(id) = state.session.id() {
                return Err(StartError::SessionActive(id.clone()));
            }
        }
        self.reset_locked(&mut state);

        let id = state.session.begin(question.clone(), attachment.clone());
        state.decoder.reset();
        let (abort_tx, abort_rx) = watch::channel(false);
        state.abort = Some(abort_tx);

        tracing::info!(session_id = %id, "Session started");
        self.notify(SessionUpdate::Started {
            session_id: id.clone(),
            question,
            attachment,
        });
        Ok((id, abort_rx))
    }

    /// Run `f` if the expected session (or, with `None`, any session) is active
    fn with_active<R>(
        &self,
        id: Option<&SessionId>,
        f: impl FnOnce(&Self, &mut ConsumerState) -> R,
    ) -> Option<R> {
        let mut state = self.shared.state.lock();
        let matches = match id {
            Some(id) => state.session.is_active_session(id),
            None => state.session.is_active(),
        };
        if !matches {
            if let Some(id) = id {
                tracing::debug!(session_id = %id, "Discarding input for inactive session");
            }
            return None;
        }
        Some(f(self, &mut state))
    }

    fn feed_locked(&self, state: &mut ConsumerState, raw: &[u8]) {
        let blocks = state.decoder.push(raw);
        self.apply_blocks_locked(state, blocks);
    }

    fn apply_blocks_locked(&self, state: &mut ConsumerState, blocks: Vec<String>) {
        let mut blocks = blocks.into_iter();
        for block in blocks.by_ref() {
            let Some(payload) = data_payload(&block) else {
                if !block.trim().is_empty() {
                    tracing::debug!(block = %block.trim(), "Ignoring non-data block");
                }
                continue;
            };
            match StreamEvent::parse(payload) {
                Ok(event) => self.apply_event_locked(state, event),
                Err(e) => tracing::warn!(error = %e, payload, "Dropping malformed event"),
            }
            if !state.session.is_active() {
                break;
            }
        }

        let discarded = blocks.filter(|b| data_payload(b).is_some()).count();
        if discarded > 0 {
            tracing::warn!(discarded, "Discarding blocks after terminal event");
        }
    }

    fn apply_event_locked(&self, state: &mut ConsumerState, event: StreamEvent) {
        let Some(id) = state.session.id().cloned().filter(|_| state.session.is_active()) else {
            tracing::warn!(kind = event.kind(), "Event ignored, no active session");
            return;
        };

        match event {
            StreamEvent::Start { id: request_id } => {
                tracing::debug!(session_id = %id, request_id = ?request_id, "Server acknowledged request");
            }
            StreamEvent::Chunk { text } => {
                if text.is_empty() {
                    return;
                }
                state.session.append(&text);
                self.notify(SessionUpdate::Chunk {
                    session_id: id,
                    text,
                });
            }
            StreamEvent::Metadata { payload } => {
                tracing::debug!(session_id = %id, keys = payload.len(), "Metadata stashed");
                state.session.stash_metadata(payload.clone());
                self.notify(SessionUpdate::Metadata {
                    session_id: id,
                    payload,
                });
            }
            StreamEvent::Error { message } => {
                tracing::warn!(session_id = %id, error = %message, "Server reported an error");
                self.fail_with(state, SessionFailure::Server(message));
            }
            StreamEvent::End => {
                self.finalize_locked(state);
            }
        }
    }

    fn finish_locked(&self, state: &mut ConsumerState) {
        if let Some(rest) = state.decoder.finish() {
            self.apply_blocks_locked(state, vec![rest]);
        }
        if state.session.is_active() {
            tracing::debug!(
                session_id = ?state.session.id(),
                "Stream ended without an end event, finalizing"
            );
            self.finalize_locked(state);
        }
    }

    fn fail_locked(&self, state: &mut ConsumerState, error: &TransportError) {
        tracing::error!(session_id = ?state.session.id(), error = %error, "Transport failed");
        self.fail_with(state, SessionFailure::Transport(error.to_string()));
    }

    fn fail_with(&self, state: &mut ConsumerState, failure: SessionFailure) {
        let Some(id) = state.session.id().cloned() else {
            return;
        };
        let message = failure.message().to_string();
        let visible_answer = failure.indicator();
        if !state.session.fail(failure) {
            return;
        }
        tracing::debug!(
            session_id = %id,
            chunks = state.session.chunk_count(),
            elapsed_ms = state.session.elapsed().as_millis(),
            "Session errored"
        );

        Self::release(state);
        state.last_outcome = Some((
            id.clone(),
            SessionOutcome::Errored {
                message: message.clone(),
            },
        ));
        self.notify(SessionUpdate::Errored {
            session_id: id,
            message,
            visible_answer,
        });
    }

    fn finalize_locked(&self, state: &mut ConsumerState) -> Option<Exchange> {
        let id = state.session.id().cloned()?;
        let elapsed = state.session.elapsed();
        let exchange = state.session.complete()?;
        Self::release(state);

        self.store.append(exchange.clone());
        if let Some((cache, key)) = &self.cache {
            cache.invalidate(key);
        }

        tracing::info!(
            session_id = %id,
            exchange_id = %exchange.id.0,
            chars = exchange.answer.len(),
            elapsed_ms = elapsed.as_millis(),
            "Exchange committed"
        );
        state.last_outcome = Some((id.clone(), SessionOutcome::Completed(exchange.clone())));
        self.notify(SessionUpdate::Completed {
            session_id: id,
            exchange: exchange.clone(),
        });
        Some(exchange)
    }

    fn reset_locked(&self, state: &mut ConsumerState) -> bool {
        if !state.session.reset() {
            return false;
        }
        state.decoder.reset();
        self.notify(SessionUpdate::Reset);
        true
    }

    /// Stop the read loop and drop buffered input
    fn release(state: &mut ConsumerState) {
        if let Some(abort) = state.abort.take() {
            let _ = abort.send(true);
        }
        state.decoder.reset();
    }

    fn notify(&self, update: SessionUpdate) {
        let mut observers = self.shared.observers.lock();
        observers.retain(|tx| tx.send(update.clone()).is_ok());
    }
}
