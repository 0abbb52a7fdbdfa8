//! Infrastructure layer: configuration loading, federation networking and
//! the identity service client.

pub mod auth;
pub mod config;
pub mod net;

pub use auth::{RemoteIdentityOracle, StaticIdentityOracle};
pub use config::{Config, ConfigLoader};
pub use net::{InterswarmMessage, InterswarmRouter, SwarmRegistry};
