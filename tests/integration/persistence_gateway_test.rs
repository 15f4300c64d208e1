// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::create_test_db;
use super::helpers::fakes::RecordingSnapshotRepository;
use std::sync::Arc;
use taxrs::domain::models::entity_record::{EntityRecord, Metric, YearWindow};
use taxrs::domain::models::identifier::EntityIdentifier;
use taxrs::domain::repositories::company_repository::CompanyRepository;
use taxrs::domain::services::persistence_gateway::{PersistenceError, PersistenceGateway};
use taxrs::infrastructure::repositories::company_repo_impl::CompanyRepoImpl;
use taxrs::infrastructure::snapshot::CsvSnapshotRepository;

fn record(bin: &str, tax_2024: f64) -> EntityRecord {
    let mut record = EntityRecord::new(EntityIdentifier::parse(bin).unwrap(), YearWindow::new(2021, 2024));
    record.name = format!("Company {}", bin);
    record.series_mut(Metric::TaxPayment).set(2024, tax_2024);
    record
}

/// 测试数据库与 CSV 快照同时写入，并能从快照恢复
#[tokio::test]
async fn test_gateway_writes_store_and_snapshot() {
    let db = create_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("companies_data.csv");
    let window = YearWindow::new(2021, 2024);

    let repo = Arc::new(CompanyRepoImpl::new(db));
    let gateway = PersistenceGateway::new(
        repo.clone(),
        Arc::new(CsvSnapshotRepository::new(path.clone(), window)),
    );

    let first = record("930340000589", 1500.25);
    let second = record("000000000001", 0.0);
    gateway.upsert(&first).await.unwrap();
    gateway.upsert(&second).await.unwrap();
    gateway
        .snapshot_all(&[first.clone(), second.clone()])
        .await
        .unwrap();

    assert_eq!(repo.count().await.unwrap(), 2);
    assert!(path.exists());

    let restored = gateway.load_snapshot().await.unwrap();
    assert_eq!(restored, vec![first, second]);
}

#[tokio::test]
async fn test_snapshot_failure_is_reported() {
    let db = create_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    // A directory where the snapshot file should be makes the rename fail.
    let path = dir.path().join("blocked.csv");
    std::fs::create_dir_all(path.join("inner")).unwrap();

    let gateway = PersistenceGateway::new(
        Arc::new(CompanyRepoImpl::new(db)),
        Arc::new(CsvSnapshotRepository::new(path, YearWindow::default())),
    );

    let result = gateway.snapshot_all(&[record("1", 1.0)]).await;
    assert!(matches!(result, Err(PersistenceError::Snapshot(_))));
}

#[tokio::test]
async fn test_empty_snapshot_on_first_run() {
    let gateway = PersistenceGateway::new(
        Arc::new(CompanyRepoImpl::new(create_test_db().await)),
        RecordingSnapshotRepository::new(),
    );
    assert!(gateway.load_snapshot().await.unwrap().is_empty());
}
