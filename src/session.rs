#![cfg(feature = "web")]
//! Client-side authentication state.
//!
//! The bearer token lives in durable local storage under `auth_token`; having
//! no token simply means working signed out.

use crate::client::ApiClient;
use crate::error::ClientError;
use crate::saving::{LocalStorage, TOKEN_KEY};
use crate::store::PublicUser;
use log::{debug, info};
use std::sync::Arc;

pub struct AuthSession {
    storage: Arc<dyn LocalStorage>,
    api: ApiClient,
}

/// What the admin tab shows for the signed-in account.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountView {
    pub profile: PublicUser,
    /// Every account; only fetched for admins.
    pub users: Option<Vec<PublicUser>>,
}

impl AuthSession {
    /// Restores a previously stored token, if any.
    pub fn new(api_url: &str, storage: Arc<dyn LocalStorage>) -> Self {
        let mut api = ApiClient::new(api_url);
        api.set_token(storage.get_item(TOKEN_KEY).filter(|t| !t.is_empty()));
        Self { storage, api }
    }

    pub fn token(&self) -> Option<&str> {
        self.api.token()
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.token().is_some()
    }

    /// The client carrying the current token. Cloning it is cheap.
    pub fn client(&self) -> &ApiClient {
        &self.api
    }

    fn store_token(&mut self, token: String) {
        self.storage.set_item(TOKEN_KEY, &token);
        self.api.set_token(Some(token));
    }

    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ClientError> {
        let response = self.api.register(name, email, password).await?;
        self.store_token(response.token);
        info!("Registered and signed in as {}", response.user.email);
        Ok(response.user)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<PublicUser, ClientError> {
        let response = self.api.login(email, password).await?;
        self.store_token(response.token);
        info!("Signed in as {}", response.user.email);
        Ok(response.user)
    }

    pub fn logout(&mut self) {
        self.storage.remove_item(TOKEN_KEY);
        self.api.set_token(None);
    }

    pub async fn profile(&self) -> Result<PublicUser, ClientError> {
        self.api.profile().await
    }

    /// Profile of the signed-in account, plus the user list when it is an
    /// admin. `None` when signed out or the profile cannot be fetched.
    pub async fn account_view(&self) -> Option<AccountView> {
        if !self.is_authenticated() {
            return None;
        }

        let profile = match self.api.profile().await {
            Ok(profile) => profile,
            Err(e) => {
                debug!("Profile fetch failed: {}", e);
                return None;
            }
        };

        let users = if profile.is_admin() {
            match self.api.list_users().await {
                Ok(users) => Some(users),
                Err(e) => {
                    debug!("User list fetch failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Some(AccountView { profile, users })
    }

    pub async fn promote(&self, user_id: &str) -> Result<PublicUser, ClientError> {
        self.api.promote_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saving::MemoryStorage;

    #[test]
    fn stored_token_is_restored() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(TOKEN_KEY, "abc");
        let session = AuthSession::new("http://localhost:3000", storage);
        assert_eq!(session.token(), Some("abc"));
    }

    #[test]
    fn logout_forgets_the_token() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(TOKEN_KEY, "abc");
        let mut session = AuthSession::new("http://localhost:3000", storage.clone());

        session.logout();
        assert!(!session.is_authenticated());
        assert_eq!(storage.get_item(TOKEN_KEY), None);
    }

    #[tokio::test]
    async fn signed_out_sessions_have_no_account_view() {
        let session = AuthSession::new("http://127.0.0.1:9", Arc::new(MemoryStorage::new()));
        assert_eq!(session.account_view().await, None);
    }
}
