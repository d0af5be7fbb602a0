//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core services
//! depend only on these traits, not on concrete implementations.

mod identity;
mod store;

pub use identity::IdentityResolver;
pub use store::{AccountStore, IntentLog, TransactionLog};
