//! CLI command implementations for admin-metrics-aggregator.
//!
//! - `config`: Configuration file generation
//! - `test`: One aggregation round against the configured sources

pub mod config;

pub use config::command_config;
pub use test::command_test;
