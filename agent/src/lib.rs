pub mod agent;
pub mod args;
pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod labels;
pub mod producer;
pub mod profile_type;
pub mod retry;
pub mod rotation;
pub mod timer;

pub use crate::agent::{Agent, AgentBuilder};
pub use crate::error::AgentError;
pub use crate::profile_type::ProfileType;
