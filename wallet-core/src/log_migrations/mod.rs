//! Migrations for the event log database (`logs.duckdb`)
//!
//! Kept apart from the ledger migrations so the log database can be
//! exported, cleared or deleted without touching balances.

/// Log migrations, embedded at compile time, applied in order.
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
