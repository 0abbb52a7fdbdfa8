//! Application services for the MAIL message bus.

pub mod action_executor;
pub mod events;
pub mod runtime;
pub mod swarm;
pub mod tool_catalog;

pub use action_executor::execute_action_tool;
pub use events::EventStream;
pub use runtime::{MailRuntime, RuntimeConfig, DEFAULT_TASK_TIMEOUT};
pub use swarm::{RouterFactory, Swarm, SwarmSupervisor, SwarmTemplate};
pub use tool_catalog::{mail_tools, supervisor_tools, ToolStyle};
