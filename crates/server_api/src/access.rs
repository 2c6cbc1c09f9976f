use shared::domain::{region_prefix, Role, Session, TransferRecord, TransferStatus};
use shared::protocol::TransferQuery;

/// Role-scoped view of the transfer table. Pure: the input table is never
/// mutated and row order is preserved.
///
/// Scoping first, then the orthogonal filters in a fixed order: status
/// equality, then substring match on the transfer id. The region/branch
/// narrowing in `query` only applies to manager and owner sessions; other
/// roles are already scoped tighter than those filters could.
pub fn visible_transfers(
    table: &[TransferRecord],
    session: &Session,
    query: &TransferQuery,
) -> Vec<TransferRecord> {
    let mut rows: Vec<TransferRecord> = table
        .iter()
        .filter(|row| role_scope(row, session))
        .cloned()
        .collect();

    if matches!(session.role, Role::Manager | Role::Owner) {
        if let Some(region) = query.region.as_deref() {
            rows.retain(|row| region_prefix(&row.from_branch) == region);
        }
        if let Some(branch) = query.branch.as_deref() {
            rows.retain(|row| row.from_branch == branch);
        }
    }

    if let Some(status) = query.status {
        rows.retain(|row| row.status == status);
    }
    if let Some(search) = query.search.as_deref() {
        if !search.is_empty() {
            rows.retain(|row| row.transfer_id.contains(search));
        }
    }

    rows
}

fn role_scope(row: &TransferRecord, session: &Session) -> bool {
    match session.role {
        // Drivers see the open pickup queue plus loads they are carrying.
        Role::Driver => {
            matches!(
                row.status,
                TransferStatus::Pending | TransferStatus::PendingAtWarehouse
            ) || (row.status == TransferStatus::PickedUp && row.driver == session.username)
        }
        // Branches see inbound transfers that have not arrived yet.
        Role::Branch => {
            matches!(
                row.status,
                TransferStatus::Pending | TransferStatus::PickedUp
            ) && row.to_branch == session.branch_code
        }
        Role::Supervisor => region_prefix(&row.from_branch) == session.region_prefix(),
        Role::Manager | Role::Owner => true,
    }
}
