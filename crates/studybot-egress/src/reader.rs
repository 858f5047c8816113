//! Stream reader transport
//!
//! Used when the HTTP stack exposes the response body as an incremental byte
//! stream. Each chunk is decoded, appended to the session buffer and parsed
//! immediately.
//!
//! States: `Open` (request sent, waiting for headers) → `Reading` → `Closed`.
//! The transport closes on a completion frame, on end-of-body, or on an
//! unauthorized/non-success response before any data.

use crate::{
    config::StreamClientConfig, request::OutboundRequest, selector::TransportKind,
    transport::StreamTransport,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use studybot_core::{StreamError, StreamRequest, StreamSession, decode::Utf8Decoder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Open,
    Reading,
    Closed,
}

pub struct StreamReaderTransport {
    client: Client,
    config: Arc<StreamClientConfig>,
}

impl StreamReaderTransport {
    pub fn new(client: Client, config: Arc<StreamClientConfig>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl StreamTransport for StreamReaderTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamReader
    }

    #[instrument(skip_all, fields(transport = "stream_reader"))]
    async fn run(
        &self,
        token: &str,
        request: &StreamRequest,
        session: &mut StreamSession<'_>,
        cancel: &CancellationToken,
    ) {
        let outbound = match OutboundRequest::build(&self.config, token, request) {
            Ok(outbound) => outbound,
            Err(e) => {
                session.fail(e);
                return;
            }
        };
        outbound.log_headers("Chat Stream");

        let builder = match outbound.into_reqwest(&self.client) {
            Ok(builder) => builder,
            Err(e) => {
                session.fail(e);
                return;
            }
        };

        let mut state = ReaderState::Open;
        debug!(?state, "Sending streaming request");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                session.fail(StreamError::Cancelled);
                return;
            }
            result = builder.send() => match result {
                Ok(response) => response,
                Err(e) => {
                    warn!("Failed to open chat stream: {}", e);
                    session.fail(StreamError::Connect(e.to_string()));
                    return;
                }
            },
        };

        debug!("┌─────────────────────────────────────────────────────────");
        debug!("│ Chat Stream Response Headers");
        debug!("├─────────────────────────────────────────────────────────");
        debug!("│ Status: {}", response.status());
        for (name, value) in response.headers() {
            if let Ok(val_str) = value.to_str() {
                debug!("│ {}: {}", name, val_str);
            }
        }
        debug!("└─────────────────────────────────────────────────────────");

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Chat stream rejected the access token");
            session.fail(StreamError::Unauthorized);
            return;
        }
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Chat stream cancelled while reading error body");
                    session.fail(StreamError::Cancelled);
                    return;
                }
                body = response.text() => {
                    body.unwrap_or_else(|_| "Unable to read error body".to_string())
                }
            };
            session.fail(StreamError::HttpStatus {
                status_code: status.as_u16(),
                message: body,
            });
            return;
        }

        state = ReaderState::Reading;
        debug!(?state, "Reading chat stream");

        let mut body = response.bytes_stream();
        let mut decoder = Utf8Decoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Chat stream cancelled while reading");
                    session.fail(StreamError::Cancelled);
                    return;
                }
                next = body.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    let text = decoder.decode(&bytes);
                    if session.feed(&text) {
                        state = ReaderState::Closed;
                        debug!(?state, "Chat stream closed by completion frame");
                        return;
                    }
                }
                Some(Err(e)) => {
                    // A no-op if completion was already dispatched
                    session.fail(StreamError::Transport(format!("Stream error: {}", e)));
                    return;
                }
                None => break,
            }
        }

        state = ReaderState::Closed;
        debug!(?state, "Chat stream body ended without completion frame");

        let tail = decoder.finish();
        if session.feed(&tail) || session.flush() {
            return;
        }
        session.complete();
    }
}
