//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the account, transaction and intent stores
//! - In-memory stores for tests and throwaway sessions
//! - A static token map for the identity resolver

pub mod duckdb;
pub mod identity;
pub mod memory;

#[cfg(test)]
pub mod mock;
