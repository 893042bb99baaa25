//! Adapter implementations (hexagonal architecture)
//!
//! Adapters implement the port traits against concrete infrastructure.

pub mod duckdb;
