use chrono::{NaiveDate, Utc};
use shared::domain::{TransferRecord, TransferStatus};
use storage::Storage;

#[tokio::test]
async fn two_leg_delivery_through_the_warehouse_acceptance() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let record = TransferRecord {
        transfer_id: "TRF-1001".to_string(),
        from_branch: "RY1".to_string(),
        to_branch: "JD2".to_string(),
        value: "3200.50".parse().expect("decimal"),
        notes: "weekly cash consolidation".to_string(),
        status: TransferStatus::Pending,
        date: NaiveDate::from_ymd_opt(2026, 8, 3).expect("date"),
        driver: String::new(),
        picked_up_at: None,
        received_at: None,
    };
    storage.create_transfer(&record).await.expect("create");

    let first_leg = storage
        .mark_picked_up("TRF-1001", "driver-nasser", Utc::now())
        .await
        .expect("first pickup")
        .expect("guard matched");
    assert_eq!(first_leg.status, TransferStatus::PickedUp);
    assert_eq!(first_leg.driver, "driver-nasser");
    let first_leg_stamp = first_leg.picked_up_at.expect("stamp");

    let staged = storage
        .mark_delivered_to_warehouse("TRF-1001", "driver-nasser")
        .await
        .expect("stage")
        .expect("guard matched");
    assert_eq!(staged.status, TransferStatus::PendingAtWarehouse);
    assert_eq!(staged.driver, "");
    assert_eq!(staged.picked_up_at, Some(first_leg_stamp));

    let second_leg = storage
        .mark_picked_up("TRF-1001", "driver-huda", Utc::now())
        .await
        .expect("second pickup")
        .expect("guard matched");
    assert_eq!(second_leg.driver, "driver-huda");

    let delivered = storage
        .mark_received("TRF-1001", "JD2", Utc::now())
        .await
        .expect("receive")
        .expect("guard matched");
    assert_eq!(delivered.status, TransferStatus::Received);
    assert!(delivered.received_at.is_some());
    assert_eq!(delivered.driver, "driver-huda");
    assert_eq!(delivered.value, record.value);
    assert_eq!(delivered.notes, record.notes);
}
