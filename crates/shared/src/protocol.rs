use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Role, TransferStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub branch_code: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransferRequest {
    pub transfer_id: String,
    pub to_branch: String,
    pub value: Decimal,
    #[serde(default)]
    pub notes: String,
}

/// Narrowing filters applied after role scoping. `region` and `branch`
/// only take effect for manager/owner sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TransferStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchValue {
    pub branch: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total_transfers: usize,
    pub pending: usize,
    pub pending_at_warehouse: usize,
    pub picked_up: usize,
    pub received: usize,
    pub sent: usize,
    pub top_sender: Option<BranchValue>,
    pub top_receiver: Option<BranchValue>,
    pub total_value_sent: Decimal,
    pub total_value_received: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchActivity {
    pub branch: String,
    pub transfers: usize,
}

/// Advisory notifications, recomputed on every view and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    StaleTransfers { count: usize },
    BranchBacklog { branch: String, pending: usize },
    WarehouseQueue { count: usize },
}

impl Alert {
    pub fn message(&self) -> String {
        match self {
            Alert::StaleTransfers { count } => {
                format!("{count} transfer(s) pending for over 7 days")
            }
            Alert::BranchBacklog { branch, pending } => {
                format!("branch {branch} has {pending} pending transfers")
            }
            Alert::WarehouseQueue { count } => {
                format!("{count} transfer(s) staged at the warehouse")
            }
        }
    }
}
