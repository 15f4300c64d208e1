// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::integration::helpers::create_test_db;
use crate::integration::helpers::fake_session::{results_page, FakeSession, Results, Scenario};
use crate::integration::helpers::fakes::{dir_is_empty, FakeTranscriber, TestPipeline};
use std::sync::Arc;
use taxrs::domain::models::entity_record::{Metric, YearWindow};
use taxrs::domain::models::identifier::EntityIdentifier;
use taxrs::domain::repositories::company_repository::CompanyRepository;
use taxrs::domain::services::persistence_gateway::PersistenceGateway;
use taxrs::infrastructure::repositories::company_repo_impl::CompanyRepoImpl;
use taxrs::infrastructure::snapshot::CsvSnapshotRepository;
use taxrs::workers::orchestrator::{SharedWorkingSet, WorkingSet};

/// 单个标识号走完音频挑战：一次数据库写入、一次快照写入、工作集一条记录
#[tokio::test]
async fn test_single_identifier_with_audio_challenge() {
    let window = YearWindow::new(2021, 2024);
    let test = TestPipeline::new(window, FakeTranscriber::text("seven six two"));
    let session = FakeSession::shared(Scenario::audio_challenge());
    let orchestrator = test.pipeline.orchestrator(session.clone());

    let summary = orchestrator.run(&["930340000589"]).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.total(), 1);

    let upserts = test.repository.upserts();
    assert_eq!(upserts.len(), 1);
    let record = &upserts[0];
    assert_eq!(record.identifier.as_str(), "930340000589");
    for metric in Metric::ALL {
        let series: Vec<(i32, f64)> = record.series(metric).iter().collect();
        assert_eq!(
            series,
            vec![(2021, 0.0), (2022, 0.0), (2023, 0.0), (2024, 0.0)]
        );
    }

    assert_eq!(test.snapshot.writes().len(), 1);
    assert_eq!(orchestrator.working_set().len(), 1);
    assert!(session
        .typed()
        .contains(&("answer".to_string(), "seven six two".to_string())));
    assert!(dir_is_empty(&test.artifact_root()));
}

/// 真实持久化：SQLite 与 CSV 快照
#[tokio::test]
async fn test_workflow_with_database_and_csv_snapshot() {
    let window = YearWindow::new(2021, 2024);
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("companies_data.csv");

    let repo = Arc::new(CompanyRepoImpl::new(create_test_db().await));
    let mut test = TestPipeline::new(window, FakeTranscriber::text("one two"));
    test.pipeline.gateway = Arc::new(PersistenceGateway::new(
        repo.clone(),
        Arc::new(CsvSnapshotRepository::new(csv_path.clone(), window)),
    ));

    let page = results_page(&[
        ("Налоговые поступления", &["1 200,00", "0", "350,75", "12"]),
        ("Из них сумма возврата превышения НДС", &["", "", "", "99"]),
    ]);
    let session = FakeSession::shared(Scenario {
        results: Results::Page(page),
        ..Scenario::audio_challenge()
    });
    let orchestrator = test.pipeline.orchestrator(session);

    let summary = orchestrator.run(&["930340000589", "000000000001"]).await;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.persistence_failures, 0);

    assert_eq!(repo.count().await.unwrap(), 2);
    let stored = repo
        .find_by_identifier(&EntityIdentifier::parse("930340000589").unwrap(), window)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.tax_payments.get(2021), 1200.0);
    assert_eq!(stored.tax_payments.get(2023), 350.75);
    assert_eq!(stored.vat_refunds.get(2024), 99.0);

    let content = std::fs::read(&csv_path).unwrap();
    assert!(content.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8(content[3..].to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("bin,name,company_type,rnn,registered_at,tax_payment_2021"));
    assert!(lines[1].starts_with("930340000589,"));
    assert!(lines[2].starts_with("000000000001,"));
}

/// 启动时从快照恢复工作集，新结果与旧记录合并
#[tokio::test]
async fn test_resume_from_existing_snapshot() {
    let window = YearWindow::new(2021, 2024);
    let dir = tempfile::tempdir().unwrap();
    let snapshot = Arc::new(CsvSnapshotRepository::new(
        dir.path().join("companies_data.csv"),
        window,
    ));
    let gateway = Arc::new(PersistenceGateway::new(
        Arc::new(CompanyRepoImpl::new(create_test_db().await)),
        snapshot.clone(),
    ));

    let mut previous = taxrs::domain::models::entity_record::EntityRecord::new(
        EntityIdentifier::parse("555").unwrap(),
        window,
    );
    previous.name = "Earlier Run".to_string();
    gateway.snapshot_all(&[previous.clone()]).await.unwrap();

    let mut test = TestPipeline::new(window, FakeTranscriber::text("x"));
    test.pipeline.gateway = gateway.clone();
    test.pipeline.working_set = Arc::new(SharedWorkingSet::new(WorkingSet::from_records(
        gateway.load_snapshot().await.unwrap(),
    )));
    let orchestrator = test
        .pipeline
        .orchestrator(FakeSession::shared(Scenario::no_challenge()));

    orchestrator.run(&["930340000589"]).await;

    let restored = gateway.load_snapshot().await.unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(restored[0], previous);
    assert_eq!(restored[1].identifier.as_str(), "930340000589");
}
