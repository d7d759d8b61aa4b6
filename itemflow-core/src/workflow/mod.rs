//! Workflow engine module

pub mod access;
pub mod actions;
pub mod commands;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod pipeline;
pub mod plugins;
pub mod provider;
pub mod resumable;
pub mod store;

pub use access::*;
pub use actions::*;
pub use commands::*;
pub use engine::*;
pub use error::*;
pub use persistence::*;
pub use pipeline::*;
pub use plugins::*;
pub use provider::*;
pub use resumable::*;
pub use store::*;
