// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::entity_record::EntityRecord;

/// 单个企业的抓取结果
///
/// 实体提取器与编排器之间交换的单元
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeResult {
    /// 找到企业记录
    Found(EntityRecord),
    /// 门户明确提示无结果
    NotFound,
    /// 提取失败及原因
    Failed(String),
}

impl ScrapeResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        ScrapeResult::Failed(reason.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeResult::Found(_) => "found",
            ScrapeResult::NotFound => "not_found",
            ScrapeResult::Failed(_) => "failed",
        }
    }
}
