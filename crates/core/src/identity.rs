use crate::error::SessionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
}

/// Whoever knows which user is signed in. Consulted once per session setup.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Option<CurrentUser>;
}

/// Identity fixed at startup, e.g. from the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<CurrentUser>);

impl StaticIdentity {
    pub fn new(user: Option<CurrentUser>) -> Self {
        Self(user)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Option<CurrentUser> {
        self.0.clone()
    }
}

pub async fn resolve_user(provider: &dyn IdentityProvider) -> Result<CurrentUser, SessionError> {
    provider.current_user().await.ok_or(SessionError::NotSignedIn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_user_is_not_signed_in() {
        let identity = StaticIdentity::default();
        assert_eq!(resolve_user(&identity).await, Err(SessionError::NotSignedIn));
    }

    #[tokio::test]
    async fn resolves_the_configured_user() {
        let user = CurrentUser {
            id: "u-1".into(),
            name: "Ada".into(),
        };
        let identity = StaticIdentity::new(Some(user.clone()));
        assert_eq!(resolve_user(&identity).await, Ok(user));
    }
}
