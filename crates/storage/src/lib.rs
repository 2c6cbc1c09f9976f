use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{AccountId, Role, TransferRecord, TransferStatus};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    database_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub account_id: AccountId,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub branch_code: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    DuplicateTransferId,
}

const TRANSFER_COLUMNS: &str = "transfer_id, from_branch, to_branch, value, notes, status, date, driver, picked_up_at, received_at";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            database_file: sqlite_path(database_url),
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Path of the backing SQLite file; `None` for in-memory databases.
    pub fn database_file(&self) -> Option<&Path> {
        self.database_file.as_deref()
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Creates or updates an account keyed by username. Re-running with the
    /// same username rotates the stored hash, role and branch assignment.
    pub async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
        branch_code: &str,
        display_name: &str,
    ) -> Result<AccountId> {
        let rec = sqlx::query(
            "INSERT INTO users (username, password_hash, role, branch_code, display_name)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(username) DO UPDATE SET
                password_hash = excluded.password_hash,
                role = excluded.role,
                branch_code = excluded.branch_code,
                display_name = excluded.display_name
             RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(branch_code)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(AccountId(rec.get::<i64, _>(0)))
    }

    pub async fn account_by_username(&self, username: &str) -> Result<Option<StoredAccount>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role, branch_code, display_name
             FROM users
             WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_account(&r)).transpose()
    }

    pub async fn list_accounts(&self) -> Result<Vec<StoredAccount>> {
        let rows = sqlx::query(
            "SELECT id, username, password_hash, role, branch_code, display_name
             FROM users
             ORDER BY lower(username) ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_account).collect()
    }

    /// Inserts a new transfer row. `transfer_id` is unique; a duplicate is
    /// reported as an outcome rather than an error so the caller can map it
    /// to its own conflict type.
    pub async fn create_transfer(&self, record: &TransferRecord) -> Result<CreateOutcome> {
        let result = sqlx::query(
            "INSERT INTO transfers (transfer_id, from_branch, to_branch, value, notes, status, date, driver, picked_up_at, received_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.transfer_id)
        .bind(&record.from_branch)
        .bind(&record.to_branch)
        .bind(record.value.to_string())
        .bind(&record.notes)
        .bind(record.status.as_str())
        .bind(record.date)
        .bind(&record.driver)
        .bind(record.picked_up_at)
        .bind(record.received_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(CreateOutcome::DuplicateTransferId)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Full table, newest first.
    pub async fn list_transfers(&self) -> Result<Vec<TransferRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers ORDER BY id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_transfer).collect()
    }

    pub async fn transfer_by_id(&self, transfer_id: &str) -> Result<Option<TransferRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE transfer_id = ?"
        ))
        .bind(transfer_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_transfer(&r)).transpose()
    }

    /// Atomically assigns a driver and moves the row to picked-up. The guard
    /// only matches rows that are pending (at a branch or the warehouse) with
    /// no driver yet, so of two concurrent pickups exactly one returns a row.
    pub async fn mark_picked_up(
        &self,
        transfer_id: &str,
        driver: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<TransferRecord>> {
        let row = sqlx::query(&format!(
            "UPDATE transfers
             SET status = 'picked_up', driver = ?, picked_up_at = ?
             WHERE transfer_id = ?
               AND status IN ('pending', 'pending_at_warehouse')
               AND driver = ''
             RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(driver)
        .bind(at)
        .bind(transfer_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_transfer(&r)).transpose()
    }

    /// Stages a picked-up transfer at the central warehouse. Clearing the
    /// driver assignment puts the row back behind the pickup guard, so the
    /// next leg is claimed by whichever driver gets there first.
    pub async fn mark_delivered_to_warehouse(
        &self,
        transfer_id: &str,
        driver: &str,
    ) -> Result<Option<TransferRecord>> {
        let row = sqlx::query(&format!(
            "UPDATE transfers
             SET status = 'pending_at_warehouse', driver = ''
             WHERE transfer_id = ? AND status = 'picked_up' AND driver = ?
             RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(transfer_id)
        .bind(driver)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_transfer(&r)).transpose()
    }

    /// Marks a transfer received at its destination branch. Rows already
    /// received do not match the guard, so the first stamp is never
    /// overwritten.
    pub async fn mark_received(
        &self,
        transfer_id: &str,
        to_branch: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<TransferRecord>> {
        let row = sqlx::query(&format!(
            "UPDATE transfers
             SET status = 'received', received_at = ?
             WHERE transfer_id = ?
               AND to_branch = ?
               AND status IN ('pending', 'picked_up')
             RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(at)
        .bind(transfer_id)
        .bind(to_branch)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_transfer(&r)).transpose()
    }
}

fn row_to_account(row: &SqliteRow) -> Result<StoredAccount> {
    let raw_role: String = row.try_get("role")?;
    let role = Role::parse(&raw_role).ok_or_else(|| anyhow!("unrecognized role '{raw_role}'"))?;
    Ok(StoredAccount {
        account_id: AccountId(row.try_get("id")?),
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role,
        branch_code: row.try_get("branch_code")?,
        display_name: row.try_get("display_name")?,
    })
}

fn row_to_transfer(row: &SqliteRow) -> Result<TransferRecord> {
    let raw_status: String = row.try_get("status")?;
    let status = TransferStatus::parse(&raw_status)
        .ok_or_else(|| anyhow!("unrecognized transfer status '{raw_status}'"))?;
    let raw_value: String = row.try_get("value")?;
    let value = Decimal::from_str(&raw_value)
        .with_context(|| format!("invalid decimal value '{raw_value}'"))?;
    Ok(TransferRecord {
        transfer_id: row.try_get("transfer_id")?,
        from_branch: row.try_get("from_branch")?,
        to_branch: row.try_get("to_branch")?,
        value,
        notes: row.try_get("notes")?,
        status,
        date: row.try_get::<NaiveDate, _>("date")?,
        driver: row.try_get("driver")?,
        picked_up_at: row.try_get::<Option<DateTime<Utc>>, _>("picked_up_at")?,
        received_at: row.try_get::<Option<DateTime<Utc>>, _>("received_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
