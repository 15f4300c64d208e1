// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 领域层只依赖这些抽象，具体实现由基础设施层提供：
/// - 企业记录仓库（company_repository）：按 BIN upsert 的持久化存储
/// - 快照仓库（snapshot_repository）：整体重写的 CSV 快照
pub mod company_repository;
pub mod snapshot_repository;
