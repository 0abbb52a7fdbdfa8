//! MAIL - Multi-Agent Interface Layer
//!
//! An in-process message bus and HTTP federation layer for coordinating
//! heterogeneous LLM-driven agents:
//! - Per-tenant priority-scheduled message dispatcher
//! - Typed email-like message model with an XML agent rendering
//! - Cooperative agent turns producing tool-call bundles
//! - Federated inter-swarm routing over HTTP with local task accounting
//! - Streaming task telemetry with per-task futures and backpressure
//!
//! The LLM call itself, action tool bodies, identity verification and the
//! agent memory store are external collaborators behind the ports in
//! [`domain::ports`].

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::models::{Address, MailMessage, MessageKind};
pub use services::{MailRuntime, Swarm, SwarmSupervisor, SwarmTemplate};
