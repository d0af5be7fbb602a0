//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod intent;
mod transaction;
pub mod result;

pub use account::{Account, Principal};
pub use intent::{IntentState, LegIntent, MutationIntent};
pub use transaction::{Transaction, TransactionType};
