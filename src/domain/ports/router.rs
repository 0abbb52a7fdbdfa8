//! Interswarm transport port.
//!
//! The runtime only needs to hand a message to "the federation layer" and
//! get the routed response back; the HTTP mechanics live behind this trait.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::domain::errors::RouterError;
use crate::domain::models::MailMessage;

/// Callback delivering a message into the local runtime queue.
pub type LocalDelivery = Arc<dyn Fn(MailMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Ferries messages whose recipients live in another swarm.
#[async_trait]
pub trait InterswarmTransport: Send + Sync {
    /// Open the transport (HTTP client and friends).
    async fn start(&self) -> Result<(), RouterError>;

    /// Close the transport. Idempotent.
    async fn stop(&self);

    /// Whether the transport is currently open.
    async fn is_running(&self) -> bool;

    /// Install the callback used to deliver local copies and incoming
    /// federated messages into the runtime queue.
    async fn register_local_handler(&self, handler: LocalDelivery);

    /// Route a message to its recipients, local and remote.
    ///
    /// Remote failures are folded into a synthesized Router-Error response
    /// addressed to the original sender; `Err` is reserved for a transport
    /// that cannot operate at all, in which case the caller falls back to
    /// local processing.
    async fn route_message(&self, message: MailMessage) -> Result<MailMessage, RouterError>;
}
