use super::{AuthError, Authenticator, Identity, Role};
use dashmap::DashMap;
use uuid::Uuid;

/// In-memory bearer token store.
///
/// Tokens are either provisioned from configuration via [`insert`] or
/// minted with [`register`]. State resets on restart.
///
/// [`insert`]: TokenRegistry::insert
/// [`register`]: TokenRegistry::register
pub struct TokenRegistry {
    /// token -> identity
    tokens: DashMap<String, Identity>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    /// Mint a fresh token (UUID v4) for an identity
    pub fn register(&self, agent_id: &str, role: Role) -> String {
        let token = Uuid::new_v4().to_string();
        self.tokens
            .insert(token.clone(), Identity::new(agent_id, role));
        token
    }

    /// Install a known token, replacing any identity it was bound to
    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    /// Returns whether the token existed
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    pub fn count(&self) -> usize {
        self.tokens.len()
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for TokenRegistry {
    fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(token)
            .map(|identity| identity.clone())
            .ok_or(AuthError::InvalidToken)
    }
}
