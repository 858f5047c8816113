//! Capability-based transport selection

use crate::{
    client::create_client,
    config::StreamClientConfig,
    poll::{ProgressivePollTransport, ReqwestProgressiveHttp},
    reader::StreamReaderTransport,
    transport::StreamTransport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studybot_core::Result;

/// Transport strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Incremental body reads
    StreamReader,
    /// Growing response buffer driven by readiness notifications
    ProgressivePoll,
}

/// What the runtime's HTTP stack exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportCapabilities {
    /// An incremental response-body reader is available
    #[serde(default = "default_true")]
    pub incremental_body: bool,
}

impl Default for TransportCapabilities {
    fn default() -> Self {
        Self {
            incremental_body: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Pick the transport for the given capabilities
pub fn select_kind(capabilities: &TransportCapabilities) -> TransportKind {
    if capabilities.incremental_body {
        TransportKind::StreamReader
    } else {
        TransportKind::ProgressivePoll
    }
}

/// Holds one instance of each transport and dispatches by capability
#[derive(Clone)]
pub struct TransportSelector {
    stream_reader: Arc<dyn StreamTransport>,
    progressive_poll: Arc<dyn StreamTransport>,
}

impl TransportSelector {
    pub fn new(
        stream_reader: Arc<dyn StreamTransport>,
        progressive_poll: Arc<dyn StreamTransport>,
    ) -> Self {
        Self {
            stream_reader,
            progressive_poll,
        }
    }

    /// Build both reqwest-backed transports sharing one HTTP client
    pub fn from_config(config: Arc<StreamClientConfig>) -> Result<Self> {
        let client = create_client(&config.client_config)?;

        let stream_reader = StreamReaderTransport::new(client.clone(), config.clone());
        let progressive_poll =
            ProgressivePollTransport::new(Arc::new(ReqwestProgressiveHttp::new(client)), config);

        Ok(Self::new(Arc::new(stream_reader), Arc::new(progressive_poll)))
    }

    pub fn select(&self, capabilities: &TransportCapabilities) -> &dyn StreamTransport {
        match select_kind(capabilities) {
            TransportKind::StreamReader => self.stream_reader.as_ref(),
            TransportKind::ProgressivePoll => self.progressive_poll.as_ref(),
        }
    }
}
