// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::entity_record::EntityRecord;
use async_trait::async_trait;
use thiserror::Error;

/// 快照错误类型
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV编解码错误
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// 快照内容无效
    #[error("Invalid snapshot row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
}

/// 表格快照仓库特质
///
/// 持久化存储的便利镜像，每次写入都整体重写
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// 用给定记录集合覆盖快照
    async fn write_all(&self, records: &[EntityRecord]) -> Result<(), SnapshotError>;

    /// 读取已有快照，不存在时返回空集合
    async fn load(&self) -> Result<Vec<EntityRecord>, SnapshotError>;
}
