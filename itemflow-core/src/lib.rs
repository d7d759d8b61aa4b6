//! # Itemflow Core Library
//!
//! Content-item workflow engine: drives repository items through named states,
//! gates commands behind authorization, runs action pipelines and keeps an
//! audit history of every transition.

pub mod models;
pub mod services;
pub mod workflow;
