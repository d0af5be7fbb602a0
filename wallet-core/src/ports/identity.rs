//! Identity port - credential verification
//!
//! Verifying a bearer credential is the job of an external collaborator.
//! The core only consumes the resulting principal.

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::Principal;

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolver name (e.g., "static")
    fn name(&self) -> &str;

    /// Turn a credential into a verified principal
    ///
    /// Fails with `Error::Unauthorized` when the credential is missing,
    /// malformed or unknown.
    async fn resolve(&self, credential: &str) -> Result<Principal>;
}
