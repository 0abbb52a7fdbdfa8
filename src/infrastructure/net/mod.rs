//! Federation networking: the swarm registry, the interswarm router and the
//! wire wrapper they exchange.

pub mod registry;
pub mod router;
pub mod types;

pub use registry::SwarmRegistry;
pub use router::InterswarmRouter;
pub use types::{InterswarmMessage, InterswarmMetadata};
