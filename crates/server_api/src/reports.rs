use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use shared::domain::{TransferRecord, TransferStatus};
use shared::protocol::{Alert, BranchActivity, BranchValue, KpiSummary};

pub const STALE_AFTER_DAYS: i64 = 7;
pub const BACKLOG_THRESHOLD: usize = 15;

/// Aggregates over the full table, not a role-scoped view.
pub fn kpi_summary(table: &[TransferRecord]) -> KpiSummary {
    let count = |status: TransferStatus| table.iter().filter(|r| r.status == status).count();
    KpiSummary {
        total_transfers: table.len(),
        pending: count(TransferStatus::Pending),
        pending_at_warehouse: count(TransferStatus::PendingAtWarehouse),
        picked_up: count(TransferStatus::PickedUp),
        received: count(TransferStatus::Received),
        sent: count(TransferStatus::Sent),
        top_sender: top_branch(table, |row| &row.from_branch),
        top_receiver: top_branch(table, |row| &row.to_branch),
        // "sent" survives only in historical rows; it still counts as value
        // in flight alongside picked-up loads.
        total_value_sent: table
            .iter()
            .filter(|r| matches!(r.status, TransferStatus::Sent | TransferStatus::PickedUp))
            .map(|r| r.value)
            .sum(),
        total_value_received: table
            .iter()
            .filter(|r| r.status == TransferStatus::Received)
            .map(|r| r.value)
            .sum(),
    }
}

fn top_branch<'a>(
    table: &'a [TransferRecord],
    key: impl Fn(&'a TransferRecord) -> &'a String,
) -> Option<BranchValue> {
    let mut totals: BTreeMap<&str, Decimal> = BTreeMap::new();
    for row in table {
        *totals.entry(key(row).as_str()).or_insert(Decimal::ZERO) += row.value;
    }

    // Strictly-greater keeps the first key on ties, which the BTreeMap makes
    // deterministic.
    let mut best: Option<BranchValue> = None;
    for (branch, value) in totals {
        if best.as_ref().map_or(true, |current| value > current.value) {
            best = Some(BranchValue {
                branch: branch.to_string(),
                value,
            });
        }
    }
    best
}

/// Per-sender-branch row counts, descending; the bar chart feed.
pub fn transfers_per_branch(table: &[TransferRecord]) -> Vec<BranchActivity> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in table {
        *counts.entry(row.from_branch.as_str()).or_insert(0) += 1;
    }

    let mut activity: Vec<BranchActivity> = counts
        .into_iter()
        .map(|(branch, transfers)| BranchActivity {
            branch: branch.to_string(),
            transfers,
        })
        .collect();
    activity.sort_by(|a, b| {
        b.transfers
            .cmp(&a.transfers)
            .then_with(|| a.branch.cmp(&b.branch))
    });
    activity
}

pub fn alerts(table: &[TransferRecord], today: NaiveDate) -> Vec<Alert> {
    let mut alerts = Vec::new();

    let stale = table
        .iter()
        .filter(|r| r.status != TransferStatus::Received)
        .filter(|r| (today - r.date).num_days() > STALE_AFTER_DAYS)
        .count();
    if stale > 0 {
        alerts.push(Alert::StaleTransfers { count: stale });
    }

    let mut pending_by_branch: BTreeMap<&str, usize> = BTreeMap::new();
    for row in table.iter().filter(|r| r.status == TransferStatus::Pending) {
        *pending_by_branch.entry(row.to_branch.as_str()).or_insert(0) += 1;
    }
    for (branch, pending) in pending_by_branch {
        if pending > BACKLOG_THRESHOLD {
            alerts.push(Alert::BranchBacklog {
                branch: branch.to_string(),
                pending,
            });
        }
    }

    let staged = table
        .iter()
        .filter(|r| r.status == TransferStatus::PendingAtWarehouse)
        .count();
    if staged > 0 {
        alerts.push(Alert::WarehouseQueue { count: staged });
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        transfer_id: &str,
        from: &str,
        to: &str,
        value: &str,
        status: TransferStatus,
        date: NaiveDate,
    ) -> TransferRecord {
        TransferRecord {
            transfer_id: transfer_id.to_string(),
            from_branch: from.to_string(),
            to_branch: to.to_string(),
            value: value.parse().expect("decimal"),
            notes: String::new(),
            status,
            date,
            driver: String::new(),
            picked_up_at: None,
            received_at: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, d).expect("date")
    }

    #[test]
    fn counts_every_status_separately() {
        let table = vec![
            row("T1", "RY1", "JD1", "10", TransferStatus::Pending, day(1)),
            row("T2", "RY1", "JD1", "10", TransferStatus::Pending, day(1)),
            row("T3", "RY1", "JD1", "10", TransferStatus::PickedUp, day(1)),
            row("T4", "RY1", "JD1", "10", TransferStatus::Received, day(1)),
            row("T5", "RY1", "JD1", "10", TransferStatus::Sent, day(1)),
            row(
                "T6",
                "RY1",
                "JD1",
                "10",
                TransferStatus::PendingAtWarehouse,
                day(1),
            ),
        ];

        let summary = kpi_summary(&table);
        assert_eq!(summary.total_transfers, 6);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.picked_up, 1);
        assert_eq!(summary.received, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.pending_at_warehouse, 1);
    }

    #[test]
    fn top_sender_and_receiver_use_value_sums() {
        let table = vec![
            row("T1", "RY1", "JD1", "100", TransferStatus::Pending, day(1)),
            row("T2", "RY1", "JD2", "50", TransferStatus::Pending, day(1)),
            row("T3", "RY2", "JD2", "120", TransferStatus::Pending, day(1)),
        ];

        let summary = kpi_summary(&table);
        let top_sender = summary.top_sender.expect("sender");
        assert_eq!(top_sender.branch, "RY1");
        assert_eq!(top_sender.value, "150".parse().expect("decimal"));

        let top_receiver = summary.top_receiver.expect("receiver");
        assert_eq!(top_receiver.branch, "JD2");
        assert_eq!(top_receiver.value, "170".parse().expect("decimal"));
    }

    #[test]
    fn value_totals_split_in_flight_from_delivered() {
        let table = vec![
            row("T1", "RY1", "JD1", "100.25", TransferStatus::Sent, day(1)),
            row("T2", "RY1", "JD1", "50", TransferStatus::PickedUp, day(1)),
            row("T3", "RY1", "JD1", "30.50", TransferStatus::Received, day(1)),
            row("T4", "RY1", "JD1", "999", TransferStatus::Pending, day(1)),
        ];

        let summary = kpi_summary(&table);
        assert_eq!(summary.total_value_sent, "150.25".parse().expect("decimal"));
        assert_eq!(
            summary.total_value_received,
            "30.50".parse().expect("decimal")
        );
    }

    #[test]
    fn empty_table_has_no_top_branches() {
        let summary = kpi_summary(&[]);
        assert!(summary.top_sender.is_none());
        assert!(summary.top_receiver.is_none());
        assert_eq!(summary.total_value_sent, Decimal::ZERO);
    }

    #[test]
    fn branch_activity_is_ordered_by_descending_count() {
        let table = vec![
            row("T1", "JD3", "RY1", "10", TransferStatus::Pending, day(1)),
            row("T2", "RY1", "JD1", "10", TransferStatus::Pending, day(1)),
            row("T3", "RY1", "JD2", "10", TransferStatus::Received, day(1)),
            row("T4", "RY2", "JD1", "10", TransferStatus::Pending, day(1)),
            row("T5", "RY1", "JD1", "10", TransferStatus::Sent, day(1)),
        ];

        let activity = transfers_per_branch(&table);
        assert_eq!(
            activity,
            vec![
                BranchActivity {
                    branch: "RY1".to_string(),
                    transfers: 3
                },
                BranchActivity {
                    branch: "JD3".to_string(),
                    transfers: 1
                },
                BranchActivity {
                    branch: "RY2".to_string(),
                    transfers: 1
                },
            ]
        );
    }

    #[test]
    fn stale_alert_counts_undelivered_rows_older_than_a_week() {
        let today = day(20);
        let table = vec![
            row("T1", "RY1", "JD1", "10", TransferStatus::Pending, day(1)),
            row("T2", "RY1", "JD1", "10", TransferStatus::PickedUp, day(12)),
            row("T3", "RY1", "JD1", "10", TransferStatus::Received, day(1)),
            row("T4", "RY1", "JD1", "10", TransferStatus::Pending, day(14)),
        ];

        let alerts = alerts(&table, today);
        assert_eq!(alerts, vec![Alert::StaleTransfers { count: 2 }]);
    }

    #[test]
    fn backlog_alert_fires_above_fifteen_pending_per_branch() {
        let mut table = Vec::new();
        for i in 0..16 {
            table.push(row(
                &format!("T{i}"),
                "RY1",
                "JD1",
                "10",
                TransferStatus::Pending,
                day(1),
            ));
        }
        for i in 16..31 {
            table.push(row(
                &format!("T{i}"),
                "RY1",
                "JD2",
                "10",
                TransferStatus::Pending,
                day(1),
            ));
        }

        let alerts = alerts(&table, day(2));
        assert!(alerts.contains(&Alert::BranchBacklog {
            branch: "JD1".to_string(),
            pending: 16
        }));
        assert!(!alerts
            .iter()
            .any(|alert| matches!(alert, Alert::BranchBacklog { branch, .. } if branch == "JD2")));
    }

    #[test]
    fn warehouse_alert_counts_staged_rows() {
        let table = vec![
            row(
                "T1",
                "RY1",
                "JD1",
                "10",
                TransferStatus::PendingAtWarehouse,
                day(1),
            ),
            row(
                "T2",
                "RY1",
                "JD1",
                "10",
                TransferStatus::PendingAtWarehouse,
                day(1),
            ),
            row("T3", "RY1", "JD1", "10", TransferStatus::Pending, day(1)),
        ];

        let alerts = alerts(&table, day(2));
        assert_eq!(alerts, vec![Alert::WarehouseQueue { count: 2 }]);
    }

    #[test]
    fn alert_messages_are_rendered_for_the_ui() {
        assert_eq!(
            Alert::BranchBacklog {
                branch: "JD1".to_string(),
                pending: 16
            }
            .message(),
            "branch JD1 has 16 pending transfers"
        );
    }
}
