//! Transport abstraction shared by both streaming strategies

use crate::selector::TransportKind;
use async_trait::async_trait;
use studybot_core::{StreamRequest, StreamSession};
use tokio_util::sync::CancellationToken;

/// One way of carrying a streamed reply from the backend into a session
///
/// `run` reports every outcome through `session`: replies via `feed`, the end
/// via `complete` or `fail`. It never returns an error of its own. Implementations
/// must check `cancel` at every point where they wait on the network.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn run(
        &self,
        token: &str,
        request: &StreamRequest,
        session: &mut StreamSession<'_>,
        cancel: &CancellationToken,
    );
}
