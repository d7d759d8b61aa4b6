//! CLI command handling

pub mod commands;
pub mod context;
pub mod handlers;
