use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Resolves a client credential into a verified identity. Credential
/// issuance and verification live outside this service; connections only
/// ever see the resolved identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, credential: &str) -> AppResult<Uuid>;
}

/// Static bearer-token table, for local runs and tests.
#[derive(Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, Uuid>,
}

impl StaticTokenProvider {
    pub fn new(tokens: HashMap<String, Uuid>) -> Self {
        Self { tokens }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.dev_tokens.clone())
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: Uuid) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn authenticate(&self, credential: &str) -> AppResult<Uuid> {
        self.tokens
            .get(credential)
            .copied()
            .ok_or(AppError::Unauthorized)
    }
}
