// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::entity_record::{EntityRecord, Metric, YearWindow};
use crate::domain::models::identifier::EntityIdentifier;
use crate::domain::repositories::company_repository::{CompanyRepository, RepositoryError};
use crate::infrastructure::database::entities::company;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sea_orm::sea_query::{Alias, ColumnDef, Expr, OnConflict, Query, SimpleExpr, Table};
use sea_orm::*;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 年度金额列名，如 `tax_payment_2021`
pub fn year_column(metric: Metric, year: i32) -> String {
    format!("{}_{}", metric.as_str(), year)
}

/// 窗口内全部年度列，按指标再按年份排序
pub fn year_columns(window: YearWindow) -> Vec<(Metric, i32, String)> {
    Metric::ALL
        .iter()
        .flat_map(|metric| {
            window
                .years()
                .map(move |year| (*metric, year, year_column(*metric, year)))
        })
        .collect()
}

/// 企业记录仓库实现
///
/// 单表 `companies`，以 BIN 为主键，每个指标每年一列（`tax_payment_<year>` / `vat_refund_<year>`）。
/// 写入只覆盖记录窗口内的年度列。
#[derive(Clone)]
pub struct CompanyRepoImpl {
    db: Arc<DatabaseConnection>,
}

impl CompanyRepoImpl {
    /// 创建新的企业记录仓库实现
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 为年份窗口补齐缺失的年度列
    ///
    /// 迁移只建出 2020-2024 年的列，配置了更宽的窗口时在启动阶段调用
    ///
    /// # 返回值
    ///
    /// 本次新增的列名
    pub async fn ensure_year_columns(
        &self,
        window: YearWindow,
    ) -> Result<Vec<String>, RepositoryError> {
        let existing = self.column_names().await?;
        let backend = self.db.get_database_backend();
        let mut added = Vec::new();

        for (_, _, name) in year_columns(window) {
            if existing.contains(&name) {
                continue;
            }
            let stmt = Table::alter()
                .table(company::Entity)
                .add_column(
                    ColumnDef::new(Alias::new(name.as_str()))
                        .double()
                        .not_null()
                        .default(0.0),
                )
                .to_owned();
            self.db.execute(backend.build(&stmt)).await?;
            added.push(name);
        }

        if !added.is_empty() {
            info!("Added year columns to companies: {}", added.join(", "));
        }
        Ok(added)
    }

    async fn column_names(&self) -> Result<HashSet<String>, DbErr> {
        let backend = self.db.get_database_backend();
        let sql = match backend {
            DbBackend::Sqlite => "SELECT name FROM pragma_table_info('companies')",
            DbBackend::Postgres => {
                "SELECT column_name::text AS name FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = 'companies'"
            }
            DbBackend::MySql => {
                "SELECT CAST(column_name AS CHAR) AS name FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = 'companies'"
            }
        };

        self.db
            .query_all(Statement::from_string(backend, sql))
            .await?
            .iter()
            .map(|row| row.try_get::<String>("", "name"))
            .collect()
    }

    async fn write<C: ConnectionTrait>(conn: &C, record: &EntityRecord) -> Result<(), DbErr> {
        let updated_at: DateTime<FixedOffset> = Utc::now().into();

        let mut columns = vec![
            Alias::new("name"),
            Alias::new("company_type"),
            Alias::new("rnn"),
            Alias::new("registered_at"),
            Alias::new("updated_at"),
        ];
        let mut values: Vec<SimpleExpr> = vec![
            record.name.clone().into(),
            record.legal_form.clone().into(),
            record.registration_number.clone().into(),
            record.registered_at.into(),
            updated_at.into(),
        ];
        for metric in Metric::ALL {
            for (year, amount) in record.series(metric).iter() {
                columns.push(Alias::new(year_column(metric, year)));
                values.push(amount.into());
            }
        }

        // Every column except the key is overwritten on conflict.
        let on_conflict = OnConflict::column(company::Column::Bin)
            .update_columns(columns.clone())
            .to_owned();

        let mut insert = Query::insert();
        insert
            .into_table(company::Entity)
            .columns(std::iter::once(Alias::new("bin")).chain(columns))
            .values(std::iter::once(record.identifier.as_str().into()).chain(values))
            .map_err(|e| DbErr::Custom(e.to_string()))?
            .on_conflict(on_conflict);

        conn.execute(conn.get_database_backend().build(&insert)).await?;
        Ok(())
    }
}

#[async_trait]
impl CompanyRepository for CompanyRepoImpl {
    async fn upsert(&self, record: &EntityRecord) -> Result<(), RepositoryError> {
        let txn = self.db.begin().await?;

        match Self::write(&txn, record).await {
            Ok(()) => {
                txn.commit().await?;
                debug!("Upserted company {}", record.identifier);
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!("Rollback failed for {}: {}", record.identifier, rollback);
                }
                Err(e.into())
            }
        }
    }

    async fn find_by_identifier(
        &self,
        identifier: &EntityIdentifier,
        window: YearWindow,
    ) -> Result<Option<EntityRecord>, RepositoryError> {
        let columns = year_columns(window);

        let stmt = Query::select()
            .columns([
                company::Column::Name,
                company::Column::CompanyType,
                company::Column::Rnn,
                company::Column::RegisteredAt,
            ])
            .columns(
                columns
                    .iter()
                    .map(|(_, _, name)| Alias::new(name.as_str())),
            )
            .from(company::Entity)
            .and_where(Expr::col(company::Column::Bin).eq(identifier.as_str()))
            .to_owned();

        let backend = self.db.get_database_backend();
        let Some(row) = self.db.query_one(backend.build(&stmt)).await? else {
            return Ok(None);
        };

        let mut record = EntityRecord::new(identifier.clone(), window);
        record.name = row.try_get("", "name")?;
        record.legal_form = row.try_get("", "company_type")?;
        record.registration_number = row.try_get("", "rnn")?;
        record.registered_at = row.try_get::<Option<NaiveDate>>("", "registered_at")?;

        for (metric, year, name) in &columns {
            let amount: f64 = row.try_get("", name)?;
            record.series_mut(*metric).set(*year, amount);
        }

        Ok(Some(record))
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(company::Entity::find().count(self.db.as_ref()).await?)
    }
}
