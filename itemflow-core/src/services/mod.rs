//! Host-facing services

pub mod logging;

pub use logging::*;
