//! Credential → owner resolution.

use crate::records::Owner;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Forbidden: no credential given")]
    MissingCredential,
    #[error("User not found")]
    UnknownCredential,
}

/// Resolves the owner behind a credential.
pub trait OwnerResolver: Send + Sync {
    fn resolve_owner(&self, credential: &str) -> Result<Owner, AuthError>;
}

/// Static token table, typically loaded from `[auth.tokens]` in the config.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Owner>,
}

impl TokenTable {
    pub fn new(tokens: HashMap<String, Owner>) -> Self {
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl OwnerResolver for TokenTable {
    fn resolve_owner(&self, credential: &str) -> Result<Owner, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.tokens
            .get(credential)
            .cloned()
            .ok_or(AuthError::UnknownCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TokenTable {
        TokenTable::new(HashMap::from([(
            "s3cret".to_string(),
            Owner::new("alice").unwrap(),
        )]))
    }

    #[test]
    fn known_token_resolves() {
        assert_eq!(table().resolve_owner("s3cret").unwrap().as_str(), "alice");
    }

    #[test]
    fn empty_token_is_missing() {
        assert_eq!(table().resolve_owner(""), Err(AuthError::MissingCredential));
    }

    #[test]
    fn unknown_token_is_not_found() {
        assert_eq!(
            table().resolve_owner("guess"),
            Err(AuthError::UnknownCredential)
        );
    }
}
