//! # stevedore-net
//!
//! Overlay networking as seen by the node engine: two calls, attach a
//! running task's network namespace to the overlay and detach it again.
//! Addressing, bridges, and NAT live in the network manager daemon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod client;

use async_trait::async_trait;
use stevedore_common::error::Result;

pub use client::HttpNetManager;

/// Attaches and detaches service instances to the overlay network.
#[async_trait]
pub trait NetworkManager: Send + Sync {
    /// Attaches the network namespace of `pid` to the overlay for this instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the network manager rejects or cannot serve the request.
    async fn attach(&self, pid: u32, service_name: &str, instance: u32, ports: &str) -> Result<()>;

    /// Releases the overlay resources held by this instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the network manager rejects or cannot serve the request.
    async fn detach(&self, service_name: &str, instance: u32) -> Result<()>;
}
