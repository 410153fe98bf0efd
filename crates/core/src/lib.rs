//! Shared domain types and configuration for the attestation pipeline.
//!
//! This crate has no I/O dependencies. It holds the queue payload type,
//! the content fingerprint helper, the domain error enum, and the
//! environment-driven configuration sections consumed by the other crates.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod message;

pub use error::CoreError;
pub use message::LogMessage;
