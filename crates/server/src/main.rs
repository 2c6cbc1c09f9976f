use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use server_api::{auth, ApiContext, AuthConfig};
use shared::{
    domain::{Role, Session, TransferRecord},
    error::{ApiError, ErrorCode},
    protocol::{
        Alert, BranchActivity, KpiSummary, LoginRequest, LoginResponse, NewTransferRequest,
        TransferQuery,
    },
};
use storage::Storage;
use tracing::{error, info};

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type Rejection = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext {
        storage,
        auth: AuthConfig {
            token_secret: settings.session_secret,
            token_ttl_seconds: settings.session_ttl_seconds,
        },
    };

    let state = AppState { api };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route(
            "/transfers",
            get(http_list_transfers).post(http_create_transfer),
        )
        .route("/transfers/:transfer_id/pickup", post(http_pick_up))
        .route(
            "/transfers/:transfer_id/warehouse",
            post(http_deliver_to_warehouse),
        )
        .route("/transfers/:transfer_id/receive", post(http_receive))
        .route("/kpis", get(http_kpis))
        .route("/statistics", get(http_statistics))
        .route("/alerts", get(http_alerts))
        .route("/export", get(http_export))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> Rejection {
    (status_for(err.code), Json(err))
}

/// Decodes the bearer token into the Session that every handler passes down
/// into the command layer.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<Session, Rejection> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| reject(ApiError::new(ErrorCode::Unauthorized, "missing bearer token")))?;
    auth::verify_session_token(&state.api.auth, token).ok_or_else(|| {
        reject(ApiError::new(
            ErrorCode::Unauthorized,
            "invalid or expired session token",
        ))
    })
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, Rejection> {
    let response = server_api::login(&state.api, &req.username, &req.password)
        .await
        .map_err(reject)?;
    Ok(Json(response))
}

async fn http_list_transfers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TransferQuery>,
) -> Result<Json<Vec<TransferRecord>>, Rejection> {
    let session = authorize(&state, &headers)?;
    let transfers = server_api::list_transfers(&state.api, &session, &query)
        .await
        .map_err(reject)?;
    Ok(Json(transfers))
}

async fn http_create_transfer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NewTransferRequest>,
) -> Result<(StatusCode, Json<TransferRecord>), Rejection> {
    let session = authorize(&state, &headers)?;
    let created = server_api::create_transfer(&state.api, &session, &req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn http_pick_up(
    State(state): State<Arc<AppState>>,
    Path(transfer_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TransferRecord>, Rejection> {
    let session = authorize(&state, &headers)?;
    let updated = server_api::pick_up(&state.api, &session, &transfer_id)
        .await
        .map_err(reject)?;
    Ok(Json(updated))
}

async fn http_deliver_to_warehouse(
    State(state): State<Arc<AppState>>,
    Path(transfer_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TransferRecord>, Rejection> {
    let session = authorize(&state, &headers)?;
    let updated = server_api::deliver_to_warehouse(&state.api, &session, &transfer_id)
        .await
        .map_err(reject)?;
    Ok(Json(updated))
}

async fn http_receive(
    State(state): State<Arc<AppState>>,
    Path(transfer_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TransferRecord>, Rejection> {
    let session = authorize(&state, &headers)?;
    let updated = server_api::receive(&state.api, &session, &transfer_id)
        .await
        .map_err(reject)?;
    Ok(Json(updated))
}

async fn http_kpis(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<KpiSummary>, Rejection> {
    let session = authorize(&state, &headers)?;
    let summary = server_api::kpis(&state.api, &session)
        .await
        .map_err(reject)?;
    Ok(Json(summary))
}

async fn http_statistics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BranchActivity>>, Rejection> {
    let session = authorize(&state, &headers)?;
    let activity = server_api::statistics(&state.api, &session)
        .await
        .map_err(reject)?;
    Ok(Json(activity))
}

async fn http_alerts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Alert>>, Rejection> {
    let session = authorize(&state, &headers)?;
    let alerts = server_api::notifications(&state.api, &session)
        .await
        .map_err(reject)?;
    Ok(Json(alerts))
}

/// Owner-only download of the raw persisted store.
async fn http_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Rejection> {
    let session = authorize(&state, &headers)?;
    if session.role != Role::Owner {
        return Err(reject(ApiError::new(
            ErrorCode::Forbidden,
            "only the owner may download the store",
        )));
    }

    let Some(path) = state.api.storage.database_file() else {
        return Err(reject(ApiError::new(
            ErrorCode::NotFound,
            "store has no backing file",
        )));
    };
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| reject(ApiError::new(ErrorCode::Internal, e.to_string())))?;

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("transfers.db");
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        response_headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((StatusCode::OK, response_headers, bytes))
}
