// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：标识号、企业记录、验证码结果等
/// - 仓库接口（repositories）：数据库与快照的持久化抽象接口
/// - 服务（services）：验证码求解、实体提取和持久化网关
///
/// 领域层只依赖自动化会话等抽象特质，不依赖具体的浏览器或数据库实现。
pub mod models;
pub mod repositories;
pub mod services;
