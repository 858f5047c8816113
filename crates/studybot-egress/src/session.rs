//! Session controller
//!
//! Top-level entry point for one chat message: resolves a bearer token, picks a
//! transport for the runtime's capabilities and streams the reply into the
//! caller's [`StreamHandler`].

use crate::{
    config::StreamClientConfig,
    selector::{TransportCapabilities, TransportSelector, select_kind},
};
use std::sync::Arc;
use studybot_auth::TokenManager;
use studybot_core::{Result, StreamError, StreamHandler, StreamRequest, StreamSession};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

pub struct SessionController {
    tokens: Arc<TokenManager>,
    selector: TransportSelector,
    capabilities: TransportCapabilities,
}

impl SessionController {
    pub fn new(
        tokens: Arc<TokenManager>,
        selector: TransportSelector,
        capabilities: TransportCapabilities,
    ) -> Self {
        Self {
            tokens,
            selector,
            capabilities,
        }
    }

    /// Build a controller with reqwest-backed transports
    pub fn from_config(tokens: Arc<TokenManager>, config: StreamClientConfig) -> Result<Self> {
        let capabilities = config.capabilities;
        let selector = TransportSelector::from_config(Arc::new(config))?;
        Ok(Self::new(tokens, selector, capabilities))
    }

    /// Override the runtime capabilities used for transport selection
    pub fn with_capabilities(mut self, capabilities: TransportCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    /// Stream the reply to `request` into `handler`
    ///
    /// `handler.on_chunk` fires for each non-empty reply fragment in arrival
    /// order, then exactly one of `on_done` or `on_error`. Token resolution
    /// failures are reported through `on_error` and no stream is opened.
    pub async fn send_message(&self, request: &StreamRequest, handler: &mut dyn StreamHandler) {
        self.send_message_with_cancel(request, handler, CancellationToken::new())
            .await
    }

    /// Like [`send_message`](Self::send_message), stopping early once `cancel` fires
    ///
    /// A cancelled, unfinished session reports `StreamError::Cancelled`.
    pub async fn send_message_with_cancel(
        &self,
        request: &StreamRequest,
        handler: &mut dyn StreamHandler,
        cancel: CancellationToken,
    ) {
        let span = info_span!(
            "chat_session",
            idempotency_key = %request.idempotency_key,
            transport = ?select_kind(&self.capabilities),
        );

        async move {
            let mut session = StreamSession::new(handler);

            let token = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Session cancelled before the stream opened");
                    session.fail(StreamError::Cancelled);
                    return;
                }
                token = self.tokens.get_valid_access_token() => token,
            };

            let token = match token {
                Ok(token) => token,
                Err(e) => {
                    warn!("Unable to resolve an access token: {}", e);
                    session.fail(e);
                    return;
                }
            };

            let transport = self.selector.select(&self.capabilities);
            info!("Opening chat stream via {:?}", transport.kind());
            transport.run(&token, request, &mut session, &cancel).await;

            if !session.is_finished() {
                warn!("Transport returned without finishing the session");
                session.fail(StreamError::Transport(
                    "Stream ended without a completion or error".to_string(),
                ));
                return;
            }

            debug!("Session finished after {} chunks", session.chunks_delivered());
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{selector::TransportKind, transport::StreamTransport};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use studybot_auth::{
        CredentialStore, MemoryCredentialStore, RefreshEndpoint, RefreshedTokens, TokenConfig,
    };

    #[derive(Default)]
    struct Recorder {
        chunks: Vec<String>,
        done: usize,
        errors: Vec<StreamError>,
    }

    impl StreamHandler for Recorder {
        fn on_chunk(&mut self, text: &str) {
            self.chunks.push(text.to_string());
        }

        fn on_done(&mut self) {
            self.done += 1;
        }

        fn on_error(&mut self, error: StreamError) {
            self.errors.push(error);
        }
    }

    /// Transport that feeds a fixed body and records the token it was given
    struct CannedTransport {
        kind: TransportKind,
        body: &'static str,
        tokens_seen: Mutex<Vec<String>>,
    }

    impl CannedTransport {
        fn new(kind: TransportKind, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                kind,
                body,
                tokens_seen: Mutex::new(Vec::new()),
            })
        }

        fn tokens_seen(&self) -> Vec<String> {
            self.tokens_seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StreamTransport for CannedTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        async fn run(
            &self,
            token: &str,
            _request: &StreamRequest,
            session: &mut StreamSession<'_>,
            _cancel: &CancellationToken,
        ) {
            self.tokens_seen.lock().unwrap().push(token.to_string());
            session.feed(self.body);
        }
    }

    struct StaticEndpoint(Option<&'static str>);

    #[async_trait]
    impl RefreshEndpoint for StaticEndpoint {
        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedTokens> {
            match self.0 {
                Some(token) => Ok(RefreshedTokens {
                    access_token: token.to_string(),
                    refresh_token: None,
                    expires_at: None,
                }),
                None => Err(StreamError::RefreshRejected("status 401".to_string())),
            }
        }
    }

    async fn manager(access: Option<&str>, endpoint: StaticEndpoint) -> Arc<TokenManager> {
        let keys = TokenConfig::default().keys;
        let store = Arc::new(MemoryCredentialStore::new());
        if let Some(access) = access {
            store.set(&keys.access_token, access).await.unwrap();
            store.set(&keys.refresh_token, "refresh-1").await.unwrap();
        }
        Arc::new(TokenManager::new(store, Arc::new(endpoint), TokenConfig::default()))
    }

    const REPLY: &str =
        "event: message\ndata: {\"reply\":\"Hi\"}\n\nevent: message\ndata: {\"reply\":\"\"}\n\n";

    #[tokio::test]
    async fn test_send_message_uses_selected_transport() {
        let reader = CannedTransport::new(TransportKind::StreamReader, REPLY);
        let poll = CannedTransport::new(TransportKind::ProgressivePoll, "");
        let controller = SessionController::new(
            manager(Some("cached"), StaticEndpoint(None)).await,
            TransportSelector::new(reader.clone(), poll.clone()),
            TransportCapabilities::default(),
        );

        let mut recorder = Recorder::default();
        controller
            .send_message(&StreamRequest::new("hello"), &mut recorder)
            .await;

        assert_eq!(recorder.chunks, vec!["Hi"]);
        assert_eq!(recorder.done, 1);
        assert!(recorder.errors.is_empty());
        assert_eq!(reader.tokens_seen(), vec!["cached"]);
        assert!(poll.tokens_seen().is_empty());
    }

    #[tokio::test]
    async fn test_poll_transport_selected_without_incremental_body() {
        let reader = CannedTransport::new(TransportKind::StreamReader, "");
        let poll = CannedTransport::new(TransportKind::ProgressivePoll, REPLY);
        let controller = SessionController::new(
            manager(Some("cached"), StaticEndpoint(None)).await,
            TransportSelector::new(reader.clone(), poll.clone()),
            TransportCapabilities::default(),
        )
        .with_capabilities(TransportCapabilities {
            incremental_body: false,
        });

        let mut recorder = Recorder::default();
        controller
            .send_message(&StreamRequest::new("hello"), &mut recorder)
            .await;

        assert_eq!(recorder.done, 1);
        assert!(reader.tokens_seen().is_empty());
        assert_eq!(poll.tokens_seen(), vec!["cached"]);
    }

    #[tokio::test]
    async fn test_token_failure_skips_stream() {
        let reader = CannedTransport::new(TransportKind::StreamReader, REPLY);
        let poll = CannedTransport::new(TransportKind::ProgressivePoll, REPLY);
        // nothing stored: no refresh token available
        let controller = SessionController::new(
            manager(None, StaticEndpoint(Some("never"))).await,
            TransportSelector::new(reader.clone(), poll.clone()),
            TransportCapabilities::default(),
        );

        let mut recorder = Recorder::default();
        controller
            .send_message(&StreamRequest::new("hello"), &mut recorder)
            .await;

        assert!(recorder.chunks.is_empty());
        assert_eq!(recorder.done, 0);
        assert!(matches!(recorder.errors.as_slice(), [StreamError::NoRefreshToken]));
        assert!(reader.tokens_seen().is_empty());
    }

    #[tokio::test]
    async fn test_unfinished_transport_reports_error() {
        let reader = CannedTransport::new(TransportKind::StreamReader, "data: {\"reply\":\"a\"}\n\n");
        let poll = CannedTransport::new(TransportKind::ProgressivePoll, "");
        let controller = SessionController::new(
            manager(Some("cached"), StaticEndpoint(None)).await,
            TransportSelector::new(reader, poll),
            TransportCapabilities::default(),
        );

        let mut recorder = Recorder::default();
        controller
            .send_message(&StreamRequest::new("hello"), &mut recorder)
            .await;

        assert_eq!(recorder.chunks, vec!["a"]);
        assert_eq!(recorder.done, 0);
        assert!(matches!(recorder.errors.as_slice(), [StreamError::Transport(_)]));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let reader = CannedTransport::new(TransportKind::StreamReader, REPLY);
        let poll = CannedTransport::new(TransportKind::ProgressivePoll, REPLY);
        let controller = SessionController::new(
            manager(Some("cached"), StaticEndpoint(None)).await,
            TransportSelector::new(reader.clone(), poll),
            TransportCapabilities::default(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut recorder = Recorder::default();
        controller
            .send_message_with_cancel(&StreamRequest::new("hello"), &mut recorder, cancel)
            .await;

        assert_eq!(recorder.done, 0);
        assert!(matches!(recorder.errors.as_slice(), [StreamError::Cancelled]));
        assert!(reader.tokens_seen().is_empty());
    }
}
