#![cfg(feature = "web")]

use axum::{
    Router, middleware,
    routing::{get, post},
};
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::config::ServerConfig;
use crate::login::{self, TokenKeys, require_admin, require_auth};
use crate::store::DocumentStore;
use crate::uploads;

pub const BANNER: &str = "Excel Analytics Backend is running";

pub struct AppState {
    pub store: DocumentStore,
    pub tokens: TokenKeys,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: DocumentStore, tokens: TokenKeys) -> SharedState {
        Arc::new(Self { store, tokens })
    }
}

/// Builds the REST router.
///
/// Everything except `/`, register and login requires a bearer token; the
/// admin routes additionally require the admin role.
pub fn router(state: SharedState) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/:id/promote", post(admin::promote_user))
        .route_layer(middleware::from_fn(require_admin));

    let authenticated = Router::new()
        .route("/api/auth/profile", get(login::profile))
        .route(
            "/api/uploads",
            post(uploads::create_upload).get(uploads::list_uploads),
        )
        .route("/api/uploads/:id/analysis", post(uploads::add_analysis))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/", get(|| async { BANNER }))
        .route("/api/auth/register", post(login::register))
        .route("/api/auth/login", post(login::login))
        .merge(authenticated)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serves on an already bound listener until the process stops.
pub async fn serve(listener: TcpListener, state: SharedState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = DocumentStore::open(&config.data_dir)?;
    let state = AppState::new(
        store,
        TokenKeys::new(&config.jwt_secret, config.token_ttl_hours),
    );

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!("Server running on http://{}", listener.local_addr()?);
    serve(listener, state).await?;

    Ok(())
}
