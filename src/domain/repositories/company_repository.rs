// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::entity_record::{EntityRecord, YearWindow};
use crate::domain::models::identifier::EntityIdentifier;
use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// 企业记录仓库特质
///
/// 以标识号为主键的持久化存储，写入语义为整行覆盖的 upsert
#[async_trait]
pub trait CompanyRepository: Send + Sync {
    /// 插入或整体覆盖一条记录
    async fn upsert(&self, record: &EntityRecord) -> Result<(), RepositoryError>;

    /// 根据标识号查找记录
    async fn find_by_identifier(
        &self,
        identifier: &EntityIdentifier,
        window: YearWindow,
    ) -> Result<Option<EntityRecord>, RepositoryError>;

    /// 记录总数
    async fn count(&self) -> Result<u64, RepositoryError>;
}
