//! Linked external accounts (OAuth installations) used by personal tools.
//!
//! Token refresh and at-rest encryption belong to whatever backs the
//! accessor; the agent only asks for an installation and a usable token.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Provider id of the personal knowledge search integration.
pub const SID_PROVIDER: &str = "sid";

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Account store unavailable: {0}")]
    Unavailable(String),
}

/// A user's link to one external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub user_id: String,
    pub provider: String,
    pub access_token: Option<String>,
    pub access_token_expiration: Option<DateTime<Utc>>,
}

impl Installation {
    pub fn new(user_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            provider: provider.into(),
            access_token: None,
            access_token_expiration: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, expires: Option<DateTime<Utc>>) -> Self {
        self.access_token = Some(token.into());
        self.access_token_expiration = expires;
        self
    }

    /// A token is present and not past its expiration (if it has one).
    pub fn has_live_token(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_some() && self.access_token_expiration.map_or(true, |exp| exp > now)
    }
}

#[async_trait]
pub trait AccountAccessor: Send + Sync {
    async fn installation(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<Installation>, AccountError>;

    /// A usable access token for the installation, if one can be had.
    async fn access_token(&self, installation: &Installation)
        -> Result<Option<String>, AccountError>;
}

/// Process-local installation table.
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    installations: RwLock<HashMap<(String, String), Installation>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, installation: Installation) {
        let key = (installation.user_id.clone(), installation.provider.clone());
        self.installations.write().await.insert(key, installation);
    }

    pub async fn remove(&self, user_id: &str, provider: &str) -> Option<Installation> {
        self.installations
            .write()
            .await
            .remove(&(user_id.to_string(), provider.to_string()))
    }
}

#[async_trait]
impl AccountAccessor for InMemoryAccounts {
    async fn installation(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<Installation>, AccountError> {
        Ok(self
            .installations
            .read()
            .await
            .get(&(user_id.to_string(), provider.to_string()))
            .cloned())
    }

    async fn access_token(
        &self,
        installation: &Installation,
    ) -> Result<Option<String>, AccountError> {
        if installation.has_live_token(Utc::now()) {
            Ok(installation.access_token.clone())
        } else {
            tracing::warn!(
                user_id = %installation.user_id,
                provider = %installation.provider,
                "Access token missing or expired"
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_lookup_and_tokens() {
        let accounts = InMemoryAccounts::new();
        assert!(accounts.installation("u1", SID_PROVIDER).await.unwrap().is_none());

        accounts
            .insert(Installation::new("u1", SID_PROVIDER).with_token("tok", None))
            .await;
        let installation = accounts
            .installation("u1", SID_PROVIDER)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            accounts.access_token(&installation).await.unwrap().as_deref(),
            Some("tok")
        );
        assert!(accounts.installation("u2", SID_PROVIDER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_unusable() {
        let accounts = InMemoryAccounts::new();
        let expired = Installation::new("u1", SID_PROVIDER)
            .with_token("old", Some(Utc::now() - Duration::minutes(1)));
        assert!(!expired.has_live_token(Utc::now()));
        assert_eq!(accounts.access_token(&expired).await.unwrap(), None);

        let bare = Installation::new("u1", SID_PROVIDER);
        assert_eq!(accounts.access_token(&bare).await.unwrap(), None);
    }
}
