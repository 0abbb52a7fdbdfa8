//! Domain layer for the MAIL message bus.
//!
//! This module contains the protocol models, error taxonomy and ports.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{AgentError, AuthError, RegistryError, RouterError, RuntimeError, ToolCallError};
