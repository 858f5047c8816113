//! Progressive poll transport
//!
//! Used when the HTTP stack cannot hand out the body incrementally and only
//! offers a full response buffer that keeps growing, plus a notification every
//! time the request's readiness changes.
//!
//! ## Design
//!
//! - [`ProgressiveHttp`] is the primitive: it opens a request and returns a
//!   [`ProgressiveResponse`] handle plus a channel of [`ReadyState`]s
//! - [`PollSession`] is the synchronous state machine reacting to each
//!   notification; it never awaits
//! - [`ProgressivePollTransport`] pumps notifications into a `PollSession` and
//!   watches the cancellation token in between
//!
//! On every notification only the unseen tail of the buffer (`buffer[cursor..]`)
//! is fed to the frame parser. A 401 observed before completion aborts the
//! session; once completion was dispatched a 401 is ignored, since the backend
//! may reject the token after the reply has already finished.

use crate::{
    config::StreamClientConfig, request::OutboundRequest, selector::TransportKind,
    transport::StreamTransport,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU16, Ordering},
};
use studybot_core::{Result, StreamError, StreamRequest, StreamSession, decode::Utf8Decoder};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

const UNAUTHORIZED: u16 = 401;

/// Readiness notification from the progressive primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    /// Headers and/or body bytes are arriving
    Partial,
    /// The request is fully finished
    Done,
    /// The request failed at the network level
    Error(String),
}

/// Handle to an in-flight progressive request
pub trait ProgressiveResponse: Send + Sync {
    /// Full response text received so far; only ever grows
    fn response_text(&self) -> String;

    /// Text received at or after byte `offset`
    ///
    /// `None` if `offset` is past the end of the buffer or not on a character
    /// boundary.
    fn response_text_from(&self, offset: usize) -> Option<String> {
        self.response_text().get(offset..).map(str::to_string)
    }

    /// HTTP status, `Ok(None)` if not known yet
    ///
    /// May fail while headers are still arriving; callers treat a failed read
    /// as "unknown".
    fn status(&self) -> Result<Option<u16>>;

    /// Stop the request; no further notifications are delivered
    fn abort(&self);
}

/// Request primitive that only exposes a growing buffer and readiness events
pub trait ProgressiveHttp: Send + Sync {
    fn open(
        &self,
        request: OutboundRequest,
    ) -> Result<(Arc<dyn ProgressiveResponse>, mpsc::UnboundedReceiver<ReadyState>)>;
}

/// Readiness-driven state machine for one session
pub struct PollSession<'s, 'h> {
    session: &'s mut StreamSession<'h>,
    response: &'s dyn ProgressiveResponse,
}

impl<'s, 'h> PollSession<'s, 'h> {
    pub fn new(session: &'s mut StreamSession<'h>, response: &'s dyn ProgressiveResponse) -> Self {
        Self { session, response }
    }

    pub fn is_finished(&self) -> bool {
        self.session.is_finished()
    }

    /// React to one readiness change; returns `true` once the session is finished
    pub fn on_ready_state_change(&mut self, state: ReadyState) -> bool {
        if self.session.is_finished() {
            debug!(?state, "Ignoring readiness change after session finished");
            return true;
        }

        match state {
            ReadyState::Partial => {
                self.flush_delta();
                if !self.session.is_finished() && self.read_status() == Some(UNAUTHORIZED) {
                    warn!("Chat stream rejected the access token before completion");
                    self.session.fail(StreamError::Unauthorized);
                }
            }
            ReadyState::Done => self.on_done(),
            ReadyState::Error(message) => self.on_transport_error(message),
        }

        self.session.is_finished()
    }

    /// Network-level failure reported by the primitive
    pub fn on_transport_error(&mut self, message: String) {
        if self.session.is_finished() {
            debug!("Discarding transport error after completion: {}", message);
            return;
        }
        self.session.fail(StreamError::Transport(message));
    }

    fn on_done(&mut self) {
        if self.flush_delta() {
            return;
        }

        // Trailing bytes that never received a closing delimiter
        if self.final_flush() {
            return;
        }

        match self.read_status() {
            Some(status) if (200..300).contains(&status) => {
                debug!("Chat stream finished with status {}", status);
                self.session.complete();
            }
            Some(UNAUTHORIZED) => {
                warn!("Chat stream finished with 401 before completion");
                self.session.fail(StreamError::Unauthorized);
            }
            Some(0) | None => {
                if self.session.cursor() > 0 {
                    debug!("Connection closed without status after receiving data");
                    self.session.complete();
                } else {
                    self.session.fail(StreamError::Transport(
                        "Connection closed before any response was received".to_string(),
                    ));
                }
            }
            Some(status) => {
                let body = self.response.response_text();
                self.session.fail(StreamError::HttpStatus {
                    status_code: status,
                    message: body.trim().to_string(),
                });
            }
        }
    }

    /// Feed `buffer[cursor..]` to the parser; returns `true` once finished
    fn flush_delta(&mut self) -> bool {
        if self.session.is_finished() {
            return true;
        }

        let cursor = self.session.cursor();
        let Some(delta) = self.response.response_text_from(cursor) else {
            warn!("Response buffer no longer aligned with cursor {}", cursor);
            return false;
        };
        if delta.is_empty() {
            return false;
        }

        self.session.set_cursor(cursor + delta.len());
        self.session.feed(&delta)
    }

    fn final_flush(&mut self) -> bool {
        if self.session.is_finished() {
            return true;
        }
        self.session.flush()
    }

    fn read_status(&self) -> Option<u16> {
        match self.response.status() {
            Ok(status) => status,
            Err(e) => {
                debug!("Status not readable yet: {}", e);
                None
            }
        }
    }
}

/// Transport built on a [`ProgressiveHttp`] primitive
pub struct ProgressivePollTransport {
    http: Arc<dyn ProgressiveHttp>,
    config: Arc<StreamClientConfig>,
}

impl ProgressivePollTransport {
    pub fn new(http: Arc<dyn ProgressiveHttp>, config: Arc<StreamClientConfig>) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl StreamTransport for ProgressivePollTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ProgressivePoll
    }

    #[instrument(skip_all, fields(transport = "progressive_poll"))]
    async fn run(
        &self,
        token: &str,
        request: &StreamRequest,
        session: &mut StreamSession<'_>,
        cancel: &CancellationToken,
    ) {
        if cancel.is_cancelled() {
            session.fail(StreamError::Cancelled);
            return;
        }

        let outbound = match OutboundRequest::build(&self.config, token, request) {
            Ok(outbound) => outbound,
            Err(e) => {
                session.fail(e);
                return;
            }
        };
        outbound.log_headers("Chat Poll");

        let (response, mut events) = match self.http.open(outbound) {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Failed to open progressive request: {}", e);
                session.fail(e);
                return;
            }
        };

        let mut poll = PollSession::new(session, response.as_ref());

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Chat poll cancelled");
                    response.abort();
                    poll.session.fail(StreamError::Cancelled);
                    return;
                }
                event = events.recv() => event,
            };

            let Some(state) = event else {
                poll.on_transport_error(
                    "Progressive request ended without a final readiness state".to_string(),
                );
                break;
            };

            if poll.on_ready_state_change(state) {
                break;
            }
        }

        // Either finished normally or aborted on 401; stop any remaining I/O
        response.abort();
    }
}

#[derive(Debug, Default)]
struct SharedResponse {
    text: RwLock<String>,
    /// 0 while unknown
    status: AtomicU16,
}

/// Progressive response filled by a background reqwest task
pub struct ReqwestProgressiveResponse {
    shared: Arc<SharedResponse>,
    task: AbortHandle,
}

impl ProgressiveResponse for ReqwestProgressiveResponse {
    fn response_text(&self) -> String {
        match self.shared.text.read() {
            Ok(text) => text.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn response_text_from(&self, offset: usize) -> Option<String> {
        let text = match self.shared.text.read() {
            Ok(text) => text,
            Err(poisoned) => poisoned.into_inner(),
        };
        text.get(offset..).map(str::to_string)
    }

    fn status(&self) -> Result<Option<u16>> {
        match self.shared.status.load(Ordering::Acquire) {
            0 => Ok(None),
            status => Ok(Some(status)),
        }
    }

    fn abort(&self) {
        self.task.abort();
    }
}

/// [`ProgressiveHttp`] over reqwest
///
/// A spawned task appends each decoded body chunk to the shared buffer and
/// sends a `Partial` notification per chunk, then `Done` at end-of-body.
pub struct ReqwestProgressiveHttp {
    client: Client,
}

impl ReqwestProgressiveHttp {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ProgressiveHttp for ReqwestProgressiveHttp {
    fn open(
        &self,
        request: OutboundRequest,
    ) -> Result<(Arc<dyn ProgressiveResponse>, mpsc::UnboundedReceiver<ReadyState>)> {
        let builder = request.into_reqwest(&self.client)?;
        let shared = Arc::new(SharedResponse::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let task_shared = shared.clone();
        let task = tokio::spawn(async move {
            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    let _ = tx.send(ReadyState::Error(format!("Failed to connect: {}", e)));
                    return;
                }
            };

            task_shared
                .status
                .store(response.status().as_u16(), Ordering::Release);
            let _ = tx.send(ReadyState::Partial);

            let mut body = response.bytes_stream();
            let mut decoder = Utf8Decoder::new();

            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        let text = decoder.decode(&bytes);
                        if text.is_empty() {
                            continue;
                        }
                        append(&task_shared, &text);
                        let _ = tx.send(ReadyState::Partial);
                    }
                    Err(e) => {
                        let _ = tx.send(ReadyState::Error(format!("Stream error: {}", e)));
                        return;
                    }
                }
            }

            let tail = decoder.finish();
            if !tail.is_empty() {
                append(&task_shared, &tail);
            }
            let _ = tx.send(ReadyState::Done);
        });

        let response: Arc<dyn ProgressiveResponse> = Arc::new(ReqwestProgressiveResponse {
            shared,
            task: task.abort_handle(),
        });
        Ok((response, rx))
    }
}

fn append(shared: &SharedResponse, text: &str) {
    match shared.text.write() {
        Ok(mut buffer) => buffer.push_str(text),
        Err(poisoned) => poisoned.into_inner().push_str(text),
    }
}
