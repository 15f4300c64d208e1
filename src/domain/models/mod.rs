// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 验证码结果（captcha_outcome）：求解状态机的终态
/// - 企业记录（entity_record）：企业身份信息与按年份的财务数据
/// - 标识号（identifier）：经过校验的 BIN
/// - 抓取结果（scrape_result）：提取器交给编排器的结果
pub mod captcha_outcome;
pub mod entity_record;
pub mod identifier;
pub mod scrape_result;
