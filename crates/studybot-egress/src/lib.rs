//! StudyBot Egress
//!
//! This crate streams chatbot replies from the backend:
//! - Stream reader transport (true incremental body reads)
//! - Progressive poll transport (growing response buffer + readiness events)
//! - Capability-based transport selection
//! - Session controller exposing the three-callback contract

pub mod client;
pub mod config;
pub mod poll;
pub mod reader;
pub mod request;
pub mod selector;
pub mod session;
pub mod transport;

pub use config::{BodyEncoding, StreamClientConfig};
pub use selector::{TransportCapabilities, TransportKind, TransportSelector};
pub use session::SessionController;
pub use transport::StreamTransport;
