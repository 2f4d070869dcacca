//! snapvault-server library interface
//!
//! Exposes the router and state for the binary and integration tests.

pub mod ai;
pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod storage;

pub use crate::error::{ApiError, ApiResult};

use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use snapvault_common::config::Settings;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::ai::AnalysisPipeline;
use crate::api::Diagnostics;
use crate::auth::TokenVerifier;
use crate::storage::MediaStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub settings: Arc<Settings>,
    /// Labeler plus description chain
    pub pipeline: Arc<AnalysisPipeline>,
    pub auth: Arc<TokenVerifier>,
    /// Local media storage; None disables uploads
    pub media: Option<Arc<MediaStore>>,
    /// Provider diagnostic clients; None disables the test routes
    pub diagnostics: Option<Arc<Diagnostics>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, settings: Settings, pipeline: AnalysisPipeline) -> Self {
        Self {
            db,
            auth: Arc::new(TokenVerifier::new(&settings.auth)),
            settings: Arc::new(settings),
            pipeline: Arc::new(pipeline),
            media: None,
            diagnostics: None,
            startup_time: Utc::now(),
        }
    }

    pub fn with_media(mut self, media: MediaStore) -> Self {
        self.media = Some(Arc::new(media));
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = Some(Arc::new(diagnostics));
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(api::image_routes())
        .merge(api::upload_routes(state.settings.server.max_upload_bytes))
        .merge(api::analyze_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    let mut router = Router::new().merge(protected).merge(api::health_routes());

    if state.settings.diagnostics_enabled() && state.diagnostics.is_some() {
        router = router.merge(api::diagnostic_routes());
    }

    if let Some(media) = &state.media {
        router = router.nest_service("/media", ServeDir::new(media.root()));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
