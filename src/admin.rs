#![cfg(feature = "web")]

use crate::app::SharedState;
use crate::error::ApiError;
use crate::store::{PublicUser, Role};
use crate::uploads::parse_id;
use axum::{
    Json,
    extract::{Path, State},
};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<PublicUser>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: PublicUser,
}

/// All accounts, without password hashes.
pub async fn list_users(
    State(state): State<SharedState>,
) -> Result<Json<UserListResponse>, ApiError> {
    Ok(Json(UserListResponse {
        users: state.store.list_users()?,
    }))
}

/// Grant the admin role. Promoting an admin again succeeds without changes.
pub async fn promote_user(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = parse_id(&id)?;
    let user = state
        .store
        .set_role(id, Role::Admin)?
        .ok_or(ApiError::NotFound("User not found"))?;

    info!("Promoted {} to admin", user.email);
    Ok(Json(UserResponse { user }))
}
