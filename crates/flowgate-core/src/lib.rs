pub mod command;
pub mod config;
pub mod diagram;
pub mod types;

pub use command::{CommandEnvelope, DeploymentCommand};
pub use config::FlowgateConfig;
pub use types::*;
