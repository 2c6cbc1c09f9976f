use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(AccountId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Driver,
    Branch,
    Supervisor,
    Manager,
    Owner,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "driver" => Some(Role::Driver),
            "branch" => Some(Role::Branch),
            "supervisor" => Some(Role::Supervisor),
            "manager" => Some(Role::Manager),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Branch => "branch",
            Role::Supervisor => "supervisor",
            Role::Manager => "manager",
            Role::Owner => "owner",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    PendingAtWarehouse,
    PickedUp,
    Received,
    /// Legacy status still present in historical rows; no transition assigns it.
    Sent,
}

impl TransferStatus {
    /// Accepts the spellings found in historical exports ("Picked Up",
    /// "Pending at WH") alongside the canonical snake_case names.
    pub fn parse(raw: &str) -> Option<TransferStatus> {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "pending" => Some(TransferStatus::Pending),
            "pending_at_wh" | "pending_at_warehouse" => Some(TransferStatus::PendingAtWarehouse),
            "picked_up" => Some(TransferStatus::PickedUp),
            "received" => Some(TransferStatus::Received),
            "sent" => Some(TransferStatus::Sent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::PendingAtWarehouse => "pending_at_warehouse",
            TransferStatus::PickedUp => "picked_up",
            TransferStatus::Received => "received",
            TransferStatus::Sent => "sent",
        }
    }
}

/// One movement of value between two branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transfer_id: String,
    #[serde(rename = "from")]
    pub from_branch: String,
    #[serde(rename = "to")]
    pub to_branch: String,
    pub value: Decimal,
    pub notes: String,
    pub status: TransferStatus,
    pub date: NaiveDate,
    /// Username of the assigned driver; empty until the first pickup.
    pub driver: String,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
}

/// Authenticated identity, decoded from the bearer token and passed
/// explicitly into every filtering and transition call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub branch_code: String,
    pub display_name: String,
}

impl Session {
    pub fn region_prefix(&self) -> &str {
        region_prefix(&self.branch_code)
    }
}

/// The first two characters of a branch code identify its region.
pub fn region_prefix(branch_code: &str) -> &str {
    let end = branch_code
        .char_indices()
        .nth(2)
        .map(|(index, _)| index)
        .unwrap_or(branch_code.len());
    &branch_code[..end]
}
