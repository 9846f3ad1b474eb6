//! CLI library components for the gold-layer pipeline.

pub mod config;
pub mod logging;
