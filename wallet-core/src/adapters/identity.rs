//! Static identity resolver
//!
//! Maps opaque tokens from settings.json to principals. Stands in for the
//! external verifier so the CLI can run end to end.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::result::{Error, Result};
use crate::domain::Principal;
use crate::ports::IdentityResolver;

#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    principals: HashMap<String, Principal>,
}

impl StaticIdentityResolver {
    pub fn new(principals: HashMap<String, Principal>) -> Self {
        Self { principals }
    }
}

/// Strip surrounding quotes and an optional `Bearer ` prefix
fn normalize_credential(raw: &str) -> &str {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    let token = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => &trimmed[7..],
        _ => trimmed,
    };
    token.trim().trim_matches(|c| c == '"' || c == '\'')
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    fn name(&self) -> &str {
        "static"
    }

    async fn resolve(&self, credential: &str) -> Result<Principal> {
        let token = normalize_credential(credential);
        if token.is_empty() {
            return Err(Error::unauthorized("missing credential"));
        }

        let principal = self
            .principals
            .get(token)
            .cloned()
            .ok_or_else(|| Error::unauthorized("unknown credential"))?;

        principal
            .validate()
            .map_err(|e| Error::unauthorized(format!("principal rejected: {}", e)))?;
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn resolver() -> (StaticIdentityResolver, Principal) {
        let principal = Principal::new(Uuid::new_v4(), "ana@example.com").with_name("Ana", "Diaz");
        let mut map = HashMap::new();
        map.insert("tok-ana".to_string(), principal.clone());
        map.insert("tok-bad".to_string(), Principal::new(Uuid::new_v4(), "not-an-email"));
        (StaticIdentityResolver::new(map), principal)
    }

    #[test]
    fn test_normalize_credential() {
        assert_eq!(normalize_credential("tok"), "tok");
        assert_eq!(normalize_credential("Bearer tok"), "tok");
        assert_eq!(normalize_credential("\"Bearer tok\""), "tok");
        assert_eq!(normalize_credential("bearer \"tok\""), "tok");
        assert_eq!(normalize_credential("  "), "");
    }

    #[tokio::test]
    async fn test_resolves_known_token() {
        let (resolver, principal) = resolver();
        assert_eq!(resolver.resolve("Bearer tok-ana").await.unwrap(), principal);
        assert_eq!(resolver.name(), "static");
    }

    #[tokio::test]
    async fn test_rejects_unknown_empty_and_invalid() {
        let (resolver, _) = resolver();
        assert!(matches!(resolver.resolve("nope").await, Err(Error::Unauthorized(_))));
        assert!(matches!(resolver.resolve("Bearer ").await, Err(Error::Unauthorized(_))));
        assert!(matches!(resolver.resolve("tok-bad").await, Err(Error::Unauthorized(_))));
    }
}
