//! democrm REST server.
//!
//! `/api/login` and `/api/health` are public; every other route takes the
//! [`routes::auth::AuthUser`] extractor and is rejected with 401 before the
//! handler runs when the bearer token is missing, malformed or expired.

pub mod config;
pub mod error;
pub mod routes;
pub mod storage;

use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, HeaderValue, header},
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use democrm_api::TOTAL_COUNT_HEADER;
use democrm_api::service::AccountCredentials;
use storage::ClientStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: ClientStore,
    pub config: AppConfig,
}

/// Auth settings resolved at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub account: AccountCredentials,
    pub token_ttl_secs: u64,
}

impl FromRef<AppState> for ClientStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

/// Build the full router with tracing, CORS and no-store caching applied.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // Public
        .route("/health", get(routes::health::health))
        .route("/login", post(routes::auth::login))
        // Protected
        .route("/auth/verify", get(routes::auth::verify))
        .route(
            "/clients",
            get(routes::clients::list_clients).post(routes::clients::create_client),
        )
        .route("/clients/all", get(routes::clients::all_clients))
        .route(
            "/clients/{id}",
            get(routes::clients::get_client)
                .put(routes::clients::update_client)
                .delete(routes::clients::delete_client),
        );

    Router::new()
        .nest("/api", api)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([HeaderName::from_static(TOTAL_COUNT_HEADER)]),
        )
        .with_state(state)
}
