//! studio-relay library
//!
//! Upload relay backend: accumulates chunked uploads in a session store,
//! reassembles them and hands the file to a storage vendor relay.

pub mod api;
pub mod config;
pub mod error;
pub mod notifier;
pub mod relay;
pub mod session;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use studio_common::events::EventBus;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{AuthConfig, RelayConfig};
use crate::notifier::{EventBusNotifier, ProgressNotifier};
use crate::relay::StorageRelay;
use crate::session::{MemorySessionStore, SessionStore, DEFAULT_SESSION_TIMEOUT};

/// Request body limits per upload route
#[derive(Debug, Clone, Copy)]
pub struct BodyLimits {
    pub max_chunk_bytes: usize,
    pub max_file_bytes: usize,
}

impl Default for BodyLimits {
    fn default() -> Self {
        let config = RelayConfig::default();
        Self {
            max_chunk_bytes: config.max_chunk_bytes,
            max_file_bytes: config.max_file_bytes,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// In-flight chunked uploads
    pub sessions: Arc<dyn SessionStore>,
    /// Vendor receiving assembled files
    pub relay: Arc<dyn StorageRelay>,
    /// Progress reporting, keyed by user
    pub notifier: Arc<dyn ProgressNotifier>,
    /// Event bus backing the SSE stream
    pub event_bus: EventBus,
    /// Bearer token table
    pub auth: Arc<AuthConfig>,
    /// Idle time after which the sweep drops a session
    pub session_timeout: Duration,
    pub limits: BodyLimits,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// State with an in-memory session store, progress published on `event_bus`,
    /// and authentication disabled
    pub fn new(relay: Arc<dyn StorageRelay>, event_bus: EventBus) -> Self {
        Self {
            sessions: Arc::new(MemorySessionStore::new()),
            relay,
            notifier: Arc::new(EventBusNotifier::new(event_bus.clone())),
            event_bus,
            auth: Arc::new(AuthConfig::default()),
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            limits: BodyLimits::default(),
            startup_time: Utc::now(),
        }
    }

    /// State built from a loaded configuration
    pub fn from_config(config: &RelayConfig, relay: Arc<dyn StorageRelay>) -> Self {
        Self::new(relay, EventBus::new(config.event_capacity))
            .with_auth(config.auth.clone())
            .with_session_timeout(config.session_timeout())
            .with_limits(BodyLimits {
                max_chunk_bytes: config.max_chunk_bytes,
                max_file_bytes: config.max_file_bytes,
            })
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ProgressNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_limits(mut self, limits: BodyLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Build application router
///
/// Upload, sweep and event routes require a bearer token when the token
/// table is non-empty; `/health` and `/api/buildinfo` are public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let protected = Router::new()
        .route(
            "/api/upload/chunk",
            post(api::upload_chunk).layer(DefaultBodyLimit::max(state.limits.max_chunk_bytes)),
        )
        .route(
            "/api/upload",
            post(api::upload_file).layer(DefaultBodyLimit::max(state.limits.max_file_bytes)),
        )
        .route("/api/upload/sweep", post(api::sweep_sessions))
        .route("/api/events", get(api::event_stream))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
