// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::create_test_db;
use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use taxrs::domain::models::entity_record::{EntityRecord, Metric, YearWindow};
use taxrs::domain::models::identifier::EntityIdentifier;
use taxrs::domain::repositories::company_repository::{CompanyRepository, RepositoryError};
use taxrs::infrastructure::repositories::company_repo_impl::{year_columns, CompanyRepoImpl};

fn record(name: &str, window: YearWindow, tax: f64) -> EntityRecord {
    let mut record = EntityRecord::new(EntityIdentifier::parse("930340000589").unwrap(), window);
    record.name = name.to_string();
    record.legal_form = "ТОО".to_string();
    record.registration_number = "600400123456".to_string();
    record.registered_at = NaiveDate::from_ymd_opt(2019, 3, 5);
    for year in window.years() {
        record.series_mut(Metric::TaxPayment).set(year, tax);
    }
    record.series_mut(Metric::VatRefund).set(window.last(), 17.5);
    record
}

/// 测试 upsert 幂等
///
/// 同一标识号写入两次只保留一行，内容为第二次的值
#[tokio::test]
async fn test_upsert_overwrites_existing_row() {
    let db = create_test_db().await;
    let repo = CompanyRepoImpl::new(db.clone());
    let window = YearWindow::new(2021, 2024);

    repo.upsert(&record("Alpha", window, 100.0)).await.unwrap();
    repo.upsert(&record("Alpha Renamed", window, 250.5)).await.unwrap();

    assert_eq!(repo.count().await.unwrap(), 1);

    let id = EntityIdentifier::parse("930340000589").unwrap();
    let stored = repo.find_by_identifier(&id, window).await.unwrap().unwrap();
    assert_eq!(stored, record("Alpha Renamed", window, 250.5));

    let row = db
        .query_one(Statement::from_string(
            DbBackend::Sqlite,
            "SELECT tax_payment_2021, vat_refund_2024 FROM companies WHERE bin = '930340000589'",
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.try_get::<f64>("", "tax_payment_2021").unwrap(), 250.5);
    assert_eq!(row.try_get::<f64>("", "vat_refund_2024").unwrap(), 17.5);
}

/// 记录窗口外的年度列保持原值
#[tokio::test]
async fn test_upsert_leaves_years_outside_window() {
    let db = create_test_db().await;
    let repo = CompanyRepoImpl::new(db);

    repo.upsert(&record("Alpha", YearWindow::new(2020, 2024), 10.0))
        .await
        .unwrap();
    repo.upsert(&record("Alpha", YearWindow::new(2023, 2024), 20.0))
        .await
        .unwrap();

    let id = EntityIdentifier::parse("930340000589").unwrap();
    let stored = repo
        .find_by_identifier(&id, YearWindow::new(2020, 2024))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stored.tax_payments.get(2020), 10.0);
    assert_eq!(stored.tax_payments.get(2022), 10.0);
    assert_eq!(stored.tax_payments.get(2023), 20.0);
    assert_eq!(stored.tax_payments.get(2024), 20.0);
}

#[test]
fn test_year_columns_order() {
    let names: Vec<String> = year_columns(YearWindow::new(2023, 2024))
        .into_iter()
        .map(|(_, _, name)| name)
        .collect();
    assert_eq!(
        names,
        vec![
            "tax_payment_2023",
            "tax_payment_2024",
            "vat_refund_2023",
            "vat_refund_2024"
        ]
    );
}

/// 配置更宽的窗口时补齐年度列，重复调用不再新增
#[tokio::test]
async fn test_ensure_year_columns_extends_table() {
    let db = create_test_db().await;
    let repo = CompanyRepoImpl::new(db);
    let window = YearWindow::new(2019, 2025);

    assert!(repo
        .ensure_year_columns(YearWindow::default())
        .await
        .unwrap()
        .is_empty());

    let added = repo.ensure_year_columns(window).await.unwrap();
    assert_eq!(
        added,
        vec![
            "tax_payment_2019",
            "tax_payment_2025",
            "vat_refund_2019",
            "vat_refund_2025"
        ]
    );
    assert!(repo.ensure_year_columns(window).await.unwrap().is_empty());

    repo.upsert(&record("Alpha", window, 3.0)).await.unwrap();
    let id = EntityIdentifier::parse("930340000589").unwrap();
    let stored = repo.find_by_identifier(&id, window).await.unwrap().unwrap();
    assert_eq!(stored, record("Alpha", window, 3.0));
}

/// 写入不存在的年度列失败，已有记录不变
#[tokio::test]
async fn test_failed_write_keeps_previous_row() {
    let db = create_test_db().await;
    let repo = CompanyRepoImpl::new(db);
    let id = EntityIdentifier::parse("930340000589").unwrap();

    repo.upsert(&record("Alpha", YearWindow::default(), 10.0))
        .await
        .unwrap();

    let result = repo
        .upsert(&record("Alpha Renamed", YearWindow::new(2018, 2024), 99.0))
        .await;

    assert!(matches!(result, Err(RepositoryError::Database(_))));
    let stored = repo
        .find_by_identifier(&id, YearWindow::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, record("Alpha", YearWindow::default(), 10.0));
}

/// 更新在数据库内被拒绝时事务回滚，旧记录保持完整
#[tokio::test]
async fn test_rejected_update_rolls_back() {
    let db = create_test_db().await;
    let repo = CompanyRepoImpl::new(db.clone());
    let id = EntityIdentifier::parse("930340000589").unwrap();
    let window = YearWindow::default();

    repo.upsert(&record("Alpha", window, 10.0)).await.unwrap();
    db.execute_unprepared(
        "CREATE TRIGGER reject_broken BEFORE UPDATE ON companies \
         WHEN NEW.name = 'Broken' \
         BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
    )
    .await
    .unwrap();

    let result = repo.upsert(&record("Broken", window, 99.0)).await;

    assert!(result.is_err());
    assert_eq!(repo.count().await.unwrap(), 1);
    let stored = repo.find_by_identifier(&id, window).await.unwrap().unwrap();
    assert_eq!(stored, record("Alpha", window, 10.0));

    // The connection is usable again after the rollback.
    repo.upsert(&record("Alpha Renamed", window, 11.0))
        .await
        .unwrap();
    let stored = repo.find_by_identifier(&id, window).await.unwrap().unwrap();
    assert_eq!(stored.name, "Alpha Renamed");
}

#[tokio::test]
async fn test_find_missing_identifier() {
    let db = create_test_db().await;
    let repo = CompanyRepoImpl::new(db);

    let id = EntityIdentifier::parse("111111111111").unwrap();
    assert!(repo
        .find_by_identifier(&id, YearWindow::default())
        .await
        .unwrap()
        .is_none());
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_distinct_identifiers_are_separate_rows() {
    let db = create_test_db().await;
    let repo = CompanyRepoImpl::new(db);
    let window = YearWindow::default();

    let mut other = record("Beta", window, 1.0);
    other.identifier = EntityIdentifier::parse("000000000001").unwrap();

    repo.upsert(&record("Alpha", window, 1.0)).await.unwrap();
    repo.upsert(&other).await.unwrap();

    assert_eq!(repo.count().await.unwrap(), 2);
}
