//! HTTP adapters.

pub mod server;

pub use server::{AppState, HttpServerConfig, MailHttpServer};
