// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含系统的技术实现细节，实现领域层定义的抽象接口。
///
/// 包含的子模块：
/// - 音频（audio）：基于 ffmpeg 的音频转码
/// - 企业信息（company_info）：公开企业信息接口的批量补充
/// - 数据库（database）：数据库连接和实体映射
/// - 仓库实现（repositories）：企业记录仓库的 SeaORM 实现
/// - 快照（snapshot）：CSV 表格快照
/// - 语音（speech）：语音识别服务客户端
pub mod audio;
pub mod company_info;
pub mod database;
pub mod repositories;
pub mod snapshot;
pub mod speech;
