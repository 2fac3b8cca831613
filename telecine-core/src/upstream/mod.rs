//! Upstream messaging-platform pipeline: the worker-client pool, the
//! per-data-center media sessions, and the chunked byte streamer that
//! feeds HTTP Range responses.
//!
//! The platform's wire codec lives behind the [`wire::Connector`] seam;
//! [`gateway`] speaks a small framed RPC to the session gateway daemon
//! that owns the proprietary protocol.

pub mod client;
pub mod gateway;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod pool;
pub mod streamer;
pub mod wire;

pub use client::WorkerClient;
pub use pool::{StreamLease, WorkerPool};
pub use streamer::{ByteStreamer, StreamerHub};
pub use wire::{FileLocator, WireError};
