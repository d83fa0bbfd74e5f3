#![cfg(feature = "web")]

use crate::app::SharedState;
use crate::error::ApiError;
use crate::store::PublicUser;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Request, State, rejection::JsonRejection},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// Registration form
///
/// Fields are optional on the wire so that a missing field produces the same
/// message as an empty one.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: String,

    /// Password in plaintext (only transmitted, never stored)
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,
}

/// Returned by both register and login
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: PublicUser,
}

/// The authenticated caller, placed in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub PublicUser);

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: String,
    exp: usize,
}

/// Signing and verification keys for bearer tokens
///
/// Tokens are HS256 JWTs carrying the user id and an expiry.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    /// # Arguments
    /// * `secret` - Shared HMAC secret
    /// * `ttl_hours` - How long an issued token stays valid
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String, ApiError> {
        let exp = (Utc::now() + self.ttl).timestamp().max(0) as usize;
        let claims = Claims {
            id: user_id.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {}", e)))
    }

    /// Checks signature and expiry and returns the user id the token names.
    pub fn verify(&self, token: &str) -> Option<Uuid> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).ok()?;
        Uuid::parse_str(&data.claims.id).ok()
    }
}

/// Hash a password for storage
///
/// # Arguments
/// * `password` - The plaintext password
///
/// # Returns
/// * `Result<String, String>` - Argon2 PHC string, or an error message
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err("Password hashing failed".to_string()),
    }
}

/// Verify a password against a stored hash
///
/// # Arguments
/// * `password` - The plaintext password to verify
/// * `hash` - The stored password hash to check against
///
/// # Returns
/// * `Result<bool, String>` - Whether the password matches, or an error for a malformed hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err("Invalid password hash format".to_string()),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Register a new account
///
/// New accounts always get the `user` role.
///
/// # Returns
/// * `{ token, user }` on success
/// * 400 when a field is missing, the email is malformed or already registered
pub async fn register(
    State(state): State<SharedState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(form) = payload?;
    let name = form.name.trim();
    let email = form.email.trim();

    if name.is_empty() || email.is_empty() || form.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Please provide name, email and password".to_string(),
        ));
    }
    if !is_valid_email(email) {
        return Err(ApiError::BadRequest(
            "Please provide a valid email".to_string(),
        ));
    }

    let password_hash = hash_password(&form.password).map_err(ApiError::Internal)?;
    let user = state
        .store
        .create_user(name, email, password_hash)?
        .ok_or_else(|| ApiError::BadRequest("User already exists".to_string()))?;

    info!("Registered user {}", user.email);
    let token = state.tokens.issue(user.id)?;
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

/// Exchange email and password for a token
///
/// Unknown email and wrong password produce the same 400 response.
pub async fn login(
    State(state): State<SharedState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(form) = payload?;
    let invalid = || ApiError::BadRequest("Invalid credentials".to_string());

    let user = state
        .store
        .find_user_by_email(form.email.trim())?
        .ok_or_else(invalid)?;

    if !verify_password(&form.password, &user.password_hash).map_err(ApiError::Internal)? {
        return Err(invalid());
    }

    let token = state.tokens.issue(user.id)?;
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

pub async fn profile(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<ProfileResponse> {
    Json(ProfileResponse { user })
}

/// Token carried by an `Authorization` header.
///
/// # Returns
/// * `Err("No token")` - No header at all
/// * `Err("Invalid token")` - A header without a second word
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(ApiError::Unauthorized("No token"))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid token"))?;

    value
        .split(' ')
        .nth(1)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthorized("Invalid token"))
}

/// Authentication middleware
///
/// Resolves the bearer token to a stored user and inserts a [`CurrentUser`]
/// into the request before any handler runs.
///
/// # Returns
/// * 401 "No token" / "Invalid token" when the caller cannot be identified
pub async fn require_auth(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?;
    let user_id = state
        .tokens
        .verify(token)
        .ok_or(ApiError::Unauthorized("Invalid token"))?;
    let user = state
        .store
        .find_user(user_id)?
        .ok_or(ApiError::Unauthorized("Invalid token"))?;

    request
        .extensions_mut()
        .insert(CurrentUser(PublicUser::from(&user)));
    Ok(next.run(request).await)
}

/// Must be layered inside [`require_auth`].
pub async fn require_admin(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !user.is_admin() {
        return Err(ApiError::Forbidden("Admin required"));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }

    #[test]
    fn tokens_name_their_user() {
        let keys = TokenKeys::new("secret", 1);
        let id = Uuid::new_v4();
        let token = keys.issue(id).unwrap();
        assert_eq!(keys.verify(&token), Some(id));
    }

    #[test]
    fn foreign_and_expired_tokens_are_rejected() {
        let id = Uuid::new_v4();
        let token = TokenKeys::new("other", 1).issue(id).unwrap();
        assert_eq!(TokenKeys::new("secret", 1).verify(&token), None);

        let expired = TokenKeys::new("secret", -2);
        let token = expired.issue(id).unwrap();
        assert_eq!(expired.verify(&token), None);
        assert_eq!(expired.verify("garbage"), None);
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            bearer_token(&headers),
            Err(ApiError::Unauthorized("No token"))
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert!(matches!(
            bearer_token(&headers),
            Err(ApiError::Unauthorized("Invalid token"))
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.de"));
    }
}
