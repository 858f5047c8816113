//! StudyBot Core Types and Traits
//!
//! This crate provides the fundamental pieces shared by the chat streaming client:
//! - Error taxonomy for authentication, transport and collaborator failures
//! - Credential record and stream request types
//! - Pure event-stream frame parser
//! - Callback contract and the one-shot session latch

pub mod decode;
pub mod error;
pub mod frame;
pub mod handler;
pub mod types;

pub use error::{Result, StreamError};
pub use handler::{FnHandler, StreamHandler, StreamSession};
pub use types::{CredentialRecord, StreamRequest};
