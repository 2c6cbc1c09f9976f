pub mod access;
pub mod auth;
pub mod reports;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use shared::{
    domain::{Role, Session, TransferRecord, TransferStatus},
    error::{ApiError, ErrorCode},
    protocol::{Alert, BranchActivity, KpiSummary, LoginResponse, NewTransferRequest, TransferQuery},
};
use storage::{CreateOutcome, Storage};

pub use auth::AuthConfig;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub auth: AuthConfig,
}

/// Credential check plus session-token mint. Unknown usernames and wrong
/// passwords are indistinguishable to the caller.
pub async fn login(
    ctx: &ApiContext,
    username: &str,
    password: &str,
) -> Result<LoginResponse, ApiError> {
    let account = ctx
        .storage
        .account_by_username(username)
        .await
        .map_err(internal)?;
    let Some(account) = account else {
        warn!(%username, "login rejected");
        return Err(invalid_credentials());
    };
    if !auth::verify_password(password, &account.password_hash) {
        warn!(%username, "login rejected");
        return Err(invalid_credentials());
    }

    let session = Session {
        username: account.username,
        role: account.role,
        branch_code: account.branch_code,
        display_name: account.display_name,
    };
    let token = auth::mint_session_token(&ctx.auth, &session)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("token mint failed: {e}")))?;
    info!(username = %session.username, role = session.role.as_str(), "login accepted");

    Ok(LoginResponse {
        token,
        username: session.username,
        role: session.role,
        branch_code: session.branch_code,
        display_name: session.display_name,
    })
}

/// The session's role-scoped slice of the table, newest first.
pub async fn list_transfers(
    ctx: &ApiContext,
    session: &Session,
    query: &TransferQuery,
) -> Result<Vec<TransferRecord>, ApiError> {
    let table = ctx.storage.list_transfers().await.map_err(internal)?;
    Ok(access::visible_transfers(&table, session, query))
}

pub async fn create_transfer(
    ctx: &ApiContext,
    session: &Session,
    req: &NewTransferRequest,
) -> Result<TransferRecord, ApiError> {
    require_role(session, &[Role::Branch])?;

    let transfer_id = req.transfer_id.trim();
    if transfer_id.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "transfer_id must not be empty",
        ));
    }
    if req.value < Decimal::ZERO {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "value must not be negative",
        ));
    }
    let to_branch = req.to_branch.trim();
    if to_branch.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "to_branch must not be empty",
        ));
    }

    let record = TransferRecord {
        transfer_id: transfer_id.to_string(),
        from_branch: session.branch_code.clone(),
        to_branch: to_branch.to_string(),
        value: req.value,
        notes: req.notes.clone(),
        status: TransferStatus::Pending,
        date: Utc::now().date_naive(),
        driver: String::new(),
        picked_up_at: None,
        received_at: None,
    };

    match ctx.storage.create_transfer(&record).await.map_err(internal)? {
        CreateOutcome::Created => {
            info!(
                transfer_id = %record.transfer_id,
                from = %record.from_branch,
                to = %record.to_branch,
                "transfer created"
            );
            Ok(record)
        }
        CreateOutcome::DuplicateTransferId => Err(ApiError::new(
            ErrorCode::Conflict,
            format!("transfer '{transfer_id}' already exists"),
        )),
    }
}

/// Driver claims a pending transfer (at a branch or the warehouse). The
/// storage guard is atomic, so of two racing pickups exactly one succeeds
/// and the other is told what state the row is in now.
pub async fn pick_up(
    ctx: &ApiContext,
    session: &Session,
    transfer_id: &str,
) -> Result<TransferRecord, ApiError> {
    require_role(session, &[Role::Driver])?;

    if let Some(updated) = ctx
        .storage
        .mark_picked_up(transfer_id, &session.username, Utc::now())
        .await
        .map_err(internal)?
    {
        info!(%transfer_id, driver = %session.username, "transfer picked up");
        return Ok(updated);
    }

    Err(transition_rejection(ctx, transfer_id, "picked up").await)
}

/// Driver stages a carried transfer at the central warehouse. Only the
/// assigned driver may hand it off.
pub async fn deliver_to_warehouse(
    ctx: &ApiContext,
    session: &Session,
    transfer_id: &str,
) -> Result<TransferRecord, ApiError> {
    require_role(session, &[Role::Driver])?;

    if let Some(updated) = ctx
        .storage
        .mark_delivered_to_warehouse(transfer_id, &session.username)
        .await
        .map_err(internal)?
    {
        info!(%transfer_id, driver = %session.username, "transfer staged at warehouse");
        return Ok(updated);
    }

    match ctx.storage.transfer_by_id(transfer_id).await {
        Ok(Some(row))
            if row.status == TransferStatus::PickedUp && row.driver != session.username =>
        {
            Err(ApiError::new(
                ErrorCode::Forbidden,
                format!("transfer '{transfer_id}' is carried by another driver"),
            ))
        }
        Ok(Some(row)) => Err(invalid_state(transfer_id, row.status, "staged at the warehouse")),
        Ok(None) => Err(not_found(transfer_id)),
        Err(err) => Err(internal(err)),
    }
}

/// Destination branch confirms arrival. A second receive is rejected and
/// the original stamp is left in place.
pub async fn receive(
    ctx: &ApiContext,
    session: &Session,
    transfer_id: &str,
) -> Result<TransferRecord, ApiError> {
    require_role(session, &[Role::Branch])?;

    if let Some(updated) = ctx
        .storage
        .mark_received(transfer_id, &session.branch_code, Utc::now())
        .await
        .map_err(internal)?
    {
        info!(%transfer_id, branch = %session.branch_code, "transfer received");
        return Ok(updated);
    }

    match ctx.storage.transfer_by_id(transfer_id).await {
        Ok(Some(row)) if row.to_branch != session.branch_code => Err(ApiError::new(
            ErrorCode::Forbidden,
            format!("transfer '{transfer_id}' is addressed to {}", row.to_branch),
        )),
        Ok(Some(row)) => Err(invalid_state(transfer_id, row.status, "received")),
        Ok(None) => Err(not_found(transfer_id)),
        Err(err) => Err(internal(err)),
    }
}

pub async fn kpis(ctx: &ApiContext, session: &Session) -> Result<KpiSummary, ApiError> {
    require_role(
        session,
        &[Role::Branch, Role::Supervisor, Role::Manager, Role::Owner],
    )?;
    let table = ctx.storage.list_transfers().await.map_err(internal)?;
    Ok(reports::kpi_summary(&table))
}

pub async fn statistics(
    ctx: &ApiContext,
    session: &Session,
) -> Result<Vec<BranchActivity>, ApiError> {
    require_role(session, &[Role::Supervisor, Role::Manager, Role::Owner])?;
    let table = ctx.storage.list_transfers().await.map_err(internal)?;
    Ok(reports::transfers_per_branch(&table))
}

pub async fn notifications(ctx: &ApiContext, session: &Session) -> Result<Vec<Alert>, ApiError> {
    require_role(session, &[Role::Supervisor, Role::Manager, Role::Owner])?;
    let table = ctx.storage.list_transfers().await.map_err(internal)?;
    Ok(reports::alerts(&table, Utc::now().date_naive()))
}

async fn transition_rejection(ctx: &ApiContext, transfer_id: &str, wanted: &str) -> ApiError {
    match ctx.storage.transfer_by_id(transfer_id).await {
        Ok(Some(row)) => invalid_state(transfer_id, row.status, wanted),
        Ok(None) => not_found(transfer_id),
        Err(err) => internal(err),
    }
}

fn invalid_state(transfer_id: &str, status: TransferStatus, wanted: &str) -> ApiError {
    ApiError::new(
        ErrorCode::Conflict,
        format!(
            "transfer '{transfer_id}' is {} and cannot be {wanted}",
            status.as_str()
        ),
    )
}

fn not_found(transfer_id: &str) -> ApiError {
    ApiError::new(
        ErrorCode::NotFound,
        format!("transfer '{transfer_id}' not found"),
    )
}

fn invalid_credentials() -> ApiError {
    ApiError::new(ErrorCode::Unauthorized, "invalid credentials")
}

fn require_role(session: &Session, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&session.role) {
        return Ok(());
    }
    Err(ApiError::new(
        ErrorCode::Forbidden,
        format!("role {} may not perform this action", session.role.as_str()),
    ))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
