//! Shared test utilities for vault-session.
//!
//! This crate provides:
//! - A scripted in-memory transport
//! - Vault response fixtures
//! - Proptest generators for domain types

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{MockReply, MockTransport, RecordedRequest};
