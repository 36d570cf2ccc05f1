//! # API REST
//!
//! REST API for the pre-triage board.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI documentation served at `/api-docs/openapi.json`
//! - REST-specific concerns (JSON serialization, CORS, session tokens)
//!
//! Business rules live in `pretriage-core`; this crate only translates.

#![warn(rust_2018_idioms)]

pub mod dto;
pub mod error;
pub mod handlers;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use pretriage_core::{
    CoreConfig, CredentialStore, FileRecordStore, PretriageResult, Reconciler, RecordStore,
    SessionContext,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use uuid::Uuid;

pub use handlers::SESSION_HEADER;

/// Application state for the REST API server
///
/// Shared by all request handlers. Sessions are held in memory and keyed by the token handed
/// out at login; restarting the server logs everyone out.
#[derive(Clone)]
pub struct AppState {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn RecordStore>,
    credentials: Arc<CredentialStore>,
    reconciler: Reconciler,
    sessions: Arc<RwLock<HashMap<Uuid, SessionContext>>>,
}

impl AppState {
    pub fn new(
        cfg: Arc<CoreConfig>,
        store: Arc<dyn RecordStore>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        let reconciler = Reconciler::new(store.clone(), cfg.vocabulary());
        Self {
            cfg,
            store,
            credentials,
            reconciler,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// State backed by the JSON tables under the configured data directory.
    pub fn from_config(cfg: Arc<CoreConfig>) -> PretriageResult<Self> {
        let store: Arc<dyn RecordStore> = Arc::new(FileRecordStore::open(cfg.records_path())?);
        let credentials = Arc::new(CredentialStore::open(cfg.users_path())?);
        Ok(Self::new(cfg, store, credentials))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::register,
        handlers::login,
        handlers::logout,
        handlers::create_record,
        handlers::list_records,
        handlers::reconcile,
    ),
    components(schemas(
        dto::HealthRes,
        dto::RegisterReq,
        dto::RegisterRes,
        dto::LoginReq,
        dto::LoginRes,
        dto::CreateRecordReq,
        dto::CreateRecordRes,
        dto::RecordRes,
        dto::ListRecordsRes,
        dto::StatusChangeReq,
        dto::PriorityChangeReq,
        dto::RecordEditReq,
        dto::ReconcileReq,
        dto::FieldResultRes,
        dto::RecordResultRes,
        dto::ReconcileRes,
        error::ErrorRes,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the router with every route, CORS and the OpenAPI document.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route(
            "/records",
            get(handlers::list_records).post(handlers::create_record),
        )
        .route("/records/reconcile", post(handlers::reconcile))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
