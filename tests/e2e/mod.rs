// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 端到端测试模块
///
/// 用脚本化会话驱动完整的抓取流程：验证码、提取、数据库与快照
pub mod scrape_workflow_test;
