// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::entity_record::EntityRecord;
use crate::domain::repositories::company_repository::{CompanyRepository, RepositoryError};
use crate::domain::repositories::snapshot_repository::{SnapshotError, SnapshotRepository};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// 持久化失败
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// 持久化存储写入失败（事务已回滚）
    #[error("Store write failed for {identifier}: {source}")]
    Store {
        identifier: String,
        source: RepositoryError,
    },
    /// 快照写入失败
    #[error("Snapshot write failed: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// 持久化网关
///
/// 每条成功提取的记录都会立即写入持久化存储并刷新快照，两者互不影响
pub struct PersistenceGateway {
    store: Arc<dyn CompanyRepository>,
    snapshot: Arc<dyn SnapshotRepository>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn CompanyRepository>, snapshot: Arc<dyn SnapshotRepository>) -> Self {
        Self { store, snapshot }
    }

    /// 以标识号为主键写入记录，冲突时整体覆盖
    ///
    /// 失败只记录日志并返回错误，不做自动重试
    pub async fn upsert(&self, record: &EntityRecord) -> Result<(), PersistenceError> {
        match self.store.upsert(record).await {
            Ok(()) => {
                info!("Company {} saved to the database", record.identifier);
                Ok(())
            }
            Err(source) => {
                error!("Failed to save company {}: {}", record.identifier, source);
                Err(PersistenceError::Store {
                    identifier: record.identifier.to_string(),
                    source,
                })
            }
        }
    }

    /// 用当前工作集整体重写快照
    pub async fn snapshot_all(&self, records: &[EntityRecord]) -> Result<(), PersistenceError> {
        match self.snapshot.write_all(records).await {
            Ok(()) => {
                debug!("Snapshot rewritten with {} records", records.len());
                Ok(())
            }
            Err(e) => {
                error!("Failed to write snapshot: {}", e);
                Err(e.into())
            }
        }
    }

    /// 读取已有快照，用于启动时恢复工作集
    pub async fn load_snapshot(&self) -> Result<Vec<EntityRecord>, PersistenceError> {
        Ok(self.snapshot.load().await?)
    }
}
