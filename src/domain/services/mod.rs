// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 挑战转写（challenge_transcriber）：音频地址 → 识别文本
/// - 验证码求解（captcha_solver）：驱动 reCAPTCHA 控件直到终态
/// - 实体提取（entity_extractor）：解析结果页中的企业记录
/// - 持久化网关（persistence_gateway）：数据库 upsert 与快照刷新
pub mod captcha_solver;
pub mod challenge_transcriber;
pub mod entity_extractor;
pub mod persistence_gateway;
