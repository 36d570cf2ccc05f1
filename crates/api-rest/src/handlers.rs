//! Request handlers.
//!
//! Store and credential calls are blocking, so each runs on the blocking pool and is bounded by
//! the configured operation timeout.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use pretriage_core::{
    FieldChange, IntakeService, PendingEdit, PretriageError, PretriageResult, RecordId, Role,
    SessionContext, SnapshotFetcher, SnapshotFilter,
};
use uuid::Uuid;

use crate::dto::{
    CreateRecordReq, CreateRecordRes, HealthRes, ListRecordsQuery, ListRecordsRes, LoginReq,
    LoginRes, ReconcileReq, ReconcileRes, RecordRes, RegisterReq, RegisterRes,
};
use crate::error::{ApiError, ErrorRes};
use crate::AppState;

/// Header carrying the token returned by `/auth/login`.
pub const SESSION_HEADER: &str = "x-session-token";

async fn run_blocking<T>(
    state: &AppState,
    operation: &'static str,
    f: impl FnOnce() -> PretriageResult<T> + Send + 'static,
) -> Result<T, ApiError>
where
    T: Send + 'static,
{
    let after = state.cfg.op_timeout();
    match tokio::time::timeout(after, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => Ok(result?),
        Ok(Err(e)) => Err(PretriageError::StoreUnavailable(format!("{operation} task failed: {e}")).into()),
        Err(_) => {
            tracing::warn!(operation, ?after, "operation timed out");
            Err(PretriageError::Timeout { operation, after }.into())
        }
    }
}

fn session_token(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let raw = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthenticated("missing x-session-token header"))?;
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::Unauthenticated("malformed session token"))
}

async fn session(state: &AppState, headers: &HeaderMap) -> Result<SessionContext, ApiError> {
    let token = session_token(headers)?;
    state
        .sessions
        .read()
        .await
        .get(&token)
        .cloned()
        .ok_or(ApiError::Unauthenticated("unknown or expired session"))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Pre-triage REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "User registered", body = RegisterRes),
        (status = 400, description = "Blank username or password", body = ErrorRes),
        (status = 409, description = "Username already taken", body = ErrorRes)
    )
)]
/// Register a nurse or doctor account.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterReq>,
) -> Result<(StatusCode, Json<RegisterRes>), ApiError> {
    let credentials = state.credentials.clone();
    let username = req.username.trim().to_string();
    let role = req.role;
    {
        let username = username.clone();
        run_blocking(&state, "register", move || {
            credentials.register(&username, &req.password, role)
        })
        .await?;
    }
    Ok((StatusCode::CREATED, Json(RegisterRes { username, role })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Session opened", body = LoginRes),
        (status = 401, description = "Unknown user or wrong password", body = ErrorRes)
    )
)]
/// Check credentials and open a session.
///
/// # Returns
/// A session token to send as the `x-session-token` header on gated endpoints.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginReq>,
) -> Result<Json<LoginRes>, ApiError> {
    let credentials = state.credentials.clone();
    let ctx = run_blocking(&state, "login", move || {
        credentials.login(&req.username, &req.password)
    })
    .await?;

    let res = LoginRes {
        token: ctx.session_id(),
        username: ctx.username().to_string(),
        role: ctx.role(),
    };
    state.sessions.write().await.insert(ctx.session_id(), ctx);
    Ok(Json(res))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    params(("x-session-token" = String, Header, description = "Session token from /auth/login")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 401, description = "Missing or unknown session", body = ErrorRes)
    )
)]
/// Close the caller's session.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = session_token(&headers)?;
    let removed = state.sessions.write().await.remove(&token);
    match removed {
        Some(ctx) => {
            tracing::info!(user = %ctx.username(), session = %token, "logout");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::Unauthenticated("unknown or expired session")),
    }
}

#[utoipa::path(
    post,
    path = "/records",
    request_body = CreateRecordReq,
    params(("x-session-token" = String, Header, description = "Nurse session token")),
    responses(
        (status = 201, description = "Patient registered as Pendiente", body = CreateRecordRes),
        (status = 400, description = "Invalid intake form", body = ErrorRes),
        (status = 403, description = "Not a nurse session", body = ErrorRes),
        (status = 503, description = "Record store unavailable", body = ErrorRes)
    )
)]
/// Register a new patient from the intake form.
///
/// # Errors
/// Returns `400 Bad Request` naming the first invalid field, and `403 Forbidden` for
/// non-nurse sessions.
#[axum::debug_handler]
pub async fn create_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRecordReq>,
) -> Result<(StatusCode, Json<CreateRecordRes>), ApiError> {
    let ctx = session(&state, &headers).await?;
    let intake = IntakeService::new(state.store.clone());
    let id = run_blocking(&state, "create", move || {
        intake.register_patient(&ctx, req.into())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(CreateRecordRes { id: id.get() })))
}

#[utoipa::path(
    get,
    path = "/records",
    params(
        ListRecordsQuery,
        ("x-session-token" = String, Header, description = "Doctor session token")
    ),
    responses(
        (status = 200, description = "Records in the current snapshot", body = ListRecordsRes),
        (status = 400, description = "Unknown priority or status filter", body = ErrorRes),
        (status = 403, description = "Not a doctor session", body = ErrorRes),
        (status = 503, description = "Record store unavailable", body = ErrorRes)
    )
)]
/// Fetch a snapshot of every record, optionally filtered.
#[axum::debug_handler]
pub async fn list_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<ListRecordsRes>, ApiError> {
    let ctx = session(&state, &headers).await?;
    ctx.require(Role::Doctor, "fetch records")?;

    let filter = SnapshotFilter {
        name_contains: query.name,
        priority: query.priority.as_deref().map(str::parse).transpose()?,
        status: query.status.as_deref().map(str::parse).transpose()?,
    };

    let fetcher = SnapshotFetcher::new(state.store.clone());
    let snapshot = run_blocking(&state, "fetch", move || fetcher.fetch()).await?;
    Ok(Json(ListRecordsRes {
        taken_at: snapshot.taken_at(),
        records: snapshot
            .filtered(&filter)
            .into_iter()
            .map(RecordRes::from)
            .collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/records/reconcile",
    request_body = ReconcileReq,
    params(("x-session-token" = String, Header, description = "Doctor session token")),
    responses(
        (status = 200, description = "Per-record outcomes; rejected fields need re-deciding", body = ReconcileRes),
        (status = 403, description = "Not a doctor session", body = ErrorRes)
    )
)]
/// Apply a doctor's edits field by field.
///
/// Status changes are compare-and-set against the `observed` value; priority changes are
/// last-writer-wins. Each field succeeds or fails on its own, so the response is `200` even
/// when some fields were rejected.
#[axum::debug_handler]
pub async fn reconcile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ReconcileReq>,
) -> Result<Json<ReconcileRes>, ApiError> {
    let ctx = session(&state, &headers).await?;
    ctx.require(Role::Doctor, "reconcile records")?;

    let mut edit = PendingEdit::default();
    for record in req.records {
        let id = RecordId::new(record.id);
        if let Some(status) = record.status {
            edit.push(
                id,
                FieldChange::Status {
                    expected: status.observed,
                    requested: status.requested,
                },
            );
        }
        if let Some(priority) = record.priority {
            edit.push(
                id,
                FieldChange::Priority {
                    requested: priority.requested,
                },
            );
        }
    }

    let reconciler = state.reconciler.clone();
    let report = run_blocking(&state, "reconcile", move || Ok(reconciler.apply(edit))).await?;
    tracing::info!(
        user = %ctx.username(),
        applied = report.applied_count(),
        rejected = report.rejections().len(),
        "reconcile request handled"
    );
    Ok(Json(ReconcileRes::from(&report)))
}
