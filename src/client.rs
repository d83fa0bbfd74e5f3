#![cfg(feature = "web")]
//! Typed HTTP client for the REST backend.

use crate::admin::{UserListResponse, UserResponse};
use crate::error::ClientError;
use crate::login::{AuthResponse, ProfileResponse};
use crate::store::PublicUser;
use crate::uploads::{NewAnalysis, NewUpload, UploadListResponse, UploadResponse, UploadView};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attaches `Authorization: Bearer <token>`, or fails without sending
    /// anything when no token is held.
    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotAuthenticated)?;
        Ok(request.bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("message")?.as_str().map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        authenticated: bool,
    ) -> Result<T, ClientError> {
        let mut request = self.http.post(self.url(path)).json(body);
        if authenticated {
            request = self.authed(request)?;
        }
        self.send(request).await
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ClientError> {
        let body = json!({ "name": name, "email": email, "password": password });
        self.post_json("/api/auth/register", &body, false).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = json!({ "email": email, "password": password });
        self.post_json("/api/auth/login", &body, false).await
    }

    pub async fn profile(&self) -> Result<PublicUser, ClientError> {
        let request = self.authed(self.http.get(self.url("/api/auth/profile")))?;
        let response: ProfileResponse = self.send(request).await?;
        Ok(response.user)
    }

    pub async fn create_upload(&self, upload: &NewUpload) -> Result<UploadView, ClientError> {
        let response: UploadResponse = self.post_json("/api/uploads", upload, true).await?;
        Ok(response.upload)
    }

    pub async fn add_analysis(
        &self,
        upload_id: &str,
        analysis: &NewAnalysis,
    ) -> Result<UploadView, ClientError> {
        let path = format!("/api/uploads/{}/analysis", urlencoding::encode(upload_id));
        let response: UploadResponse = self.post_json(&path, analysis, true).await?;
        Ok(response.upload)
    }

    pub async fn list_uploads(&self) -> Result<Vec<UploadView>, ClientError> {
        let request = self.authed(self.http.get(self.url("/api/uploads")))?;
        let response: UploadListResponse = self.send(request).await?;
        Ok(response.uploads)
    }

    pub async fn list_users(&self) -> Result<Vec<PublicUser>, ClientError> {
        let request = self.authed(self.http.get(self.url("/api/admin/users")))?;
        let response: UserListResponse = self.send(request).await?;
        Ok(response.users)
    }

    pub async fn promote_user(&self, user_id: &str) -> Result<PublicUser, ClientError> {
        let path = format!("/api/admin/users/{}/promote", urlencoding::encode(user_id));
        let response: UserResponse = self.post_json(&path, &json!({}), true).await?;
        Ok(response.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.url("/api/uploads"), "http://localhost:3000/api/uploads");
    }

    #[tokio::test]
    async fn authenticated_calls_need_a_token() {
        let client = ApiClient::new("http://127.0.0.1:9");
        assert!(matches!(
            client.list_uploads().await,
            Err(ClientError::NotAuthenticated)
        ));
    }
}
