//! Data models for itemflow

pub mod authorization;
pub mod configuration;
pub mod workflow;

pub use authorization::*;
pub use configuration::*;
pub use workflow::*;
