//! alertcast - disaster alert fan-out over Firebase Cloud Messaging
//!
//! This library looks up every user registered in a city, collects their
//! device tokens and pushes an alert to them in gateway-sized batches.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod credentials;
pub mod directory;
pub mod dispatch;
pub mod gateway;
pub mod internal_metrics;
pub mod task_manager;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export core types for convenience
pub use core::*;
