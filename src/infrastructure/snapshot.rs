// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::domain::models::entity_record::{EntityRecord, Metric, YearWindow};
use crate::domain::models::identifier::EntityIdentifier;
use crate::domain::repositories::snapshot_repository::{SnapshotError, SnapshotRepository};

const BOM: &[u8] = b"\xEF\xBB\xBF";
const IDENTITY_COLUMNS: [&str; 5] = ["bin", "name", "company_type", "rnn", "registered_at"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// CSV 快照实现
///
/// UTF-8 带 BOM，便于表格软件直接打开；每次写入先写临时文件再替换
pub struct CsvSnapshotRepository {
    path: PathBuf,
    window: YearWindow,
}

impl CsvSnapshotRepository {
    pub fn new(path: impl Into<PathBuf>, window: YearWindow) -> Self {
        Self {
            path: path.into(),
            window,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 固定表头：标识列，然后按指标、按年份展开的财务列
    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect();
        for metric in Metric::ALL {
            for year in self.window.years() {
                header.push(format!("{}_{}", metric, year));
            }
        }
        header
    }

    fn render(&self, records: &[EntityRecord]) -> Result<Vec<u8>, SnapshotError> {
        let mut writer = csv::WriterBuilder::new().from_writer(BOM.to_vec());
        writer.write_record(self.header())?;

        for record in records {
            let mut row = vec![
                record.identifier.to_string(),
                record.name.clone(),
                record.legal_form.clone(),
                record.registration_number.clone(),
                record
                    .registered_at
                    .map(|d| d.format(DATE_FORMAT).to_string())
                    .unwrap_or_default(),
            ];
            for metric in Metric::ALL {
                let series = record.series(metric);
                for year in self.window.years() {
                    row.push(series.get(year).to_string());
                }
            }
            writer.write_record(&row)?;
        }

        writer
            .into_inner()
            .map_err(|e| SnapshotError::Io(e.into_error()))
    }

    fn parse(&self, content: &[u8]) -> Result<Vec<EntityRecord>, SnapshotError> {
        let content = content.strip_prefix(BOM).unwrap_or(content);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content);

        let header = reader.headers()?.clone();
        let column = |name: &str| header.iter().position(|h| h == name);
        let Some(bin_idx) = column("bin") else {
            return Err(SnapshotError::InvalidRow {
                row: 0,
                reason: "missing bin column".to_string(),
            });
        };

        // Financial columns present in the file, whatever window they were written with.
        let financial: Vec<(usize, Metric, i32)> = header
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| {
                let (metric, year) = name.rsplit_once('_')?;
                Some((idx, Metric::parse(metric)?, year.parse().ok()?))
            })
            .collect();

        let mut records = Vec::new();
        for (row_idx, row) in reader.records().enumerate() {
            let row = row?;
            let cell = |idx: Option<usize>| {
                idx.and_then(|i| row.get(i))
                    .map(str::to_string)
                    .unwrap_or_default()
            };

            let identifier = EntityIdentifier::parse(&cell(Some(bin_idx))).map_err(|e| {
                SnapshotError::InvalidRow {
                    row: row_idx + 1,
                    reason: e.to_string(),
                }
            })?;

            let mut record = EntityRecord::new(identifier, self.window);
            record.name = cell(column("name"));
            record.legal_form = cell(column("company_type"));
            record.registration_number = cell(column("rnn"));
            record.registered_at = NaiveDate::parse_from_str(&cell(column("registered_at")), DATE_FORMAT).ok();

            for (idx, metric, year) in &financial {
                let amount = row
                    .get(*idx)
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.0);
                record.series_mut(*metric).set(*year, amount);
            }
            records.push(record);
        }
        Ok(records)
    }
}

#[async_trait]
impl SnapshotRepository for CsvSnapshotRepository {
    async fn write_all(&self, records: &[EntityRecord]) -> Result<(), SnapshotError> {
        let content = self.render(records)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let staging = self.path.with_extension("csv.tmp");
        fs::write(&staging, &content).await?;
        fs::rename(&staging, &self.path).await?;

        tracing::debug!(
            "Wrote {} records to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn load(&self) -> Result<Vec<EntityRecord>, SnapshotError> {
        match fs::read(&self.path).await {
            Ok(content) => self.parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}
