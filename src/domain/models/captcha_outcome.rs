// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;

/// 无需挑战即通过时报告的识别文本
pub const SOLVED_WITHOUT_CHALLENGE: &str = "solved without challenge";

/// 验证码求解结果
///
/// 只由验证码求解器产生，由编排器消费一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaOutcome {
    /// 音频挑战已通过，携带识别出的文本
    Success(String),
    /// 勾选复选框后直接通过
    NoChallengeNeeded,
    /// 站点拒绝下发音频挑战，需要退避
    RateLimited,
    /// 等待必需元素超时
    Timeout,
    /// 其他未预期的情况
    Unknown,
}

impl CaptchaOutcome {
    /// 是否可以继续提交表单
    pub fn is_solved(&self) -> bool {
        matches!(
            self,
            CaptchaOutcome::Success(_) | CaptchaOutcome::NoChallengeNeeded
        )
    }

    /// 识别出的文本，失败时为空
    pub fn recognized_text(&self) -> &str {
        match self {
            CaptchaOutcome::Success(text) => text,
            CaptchaOutcome::NoChallengeNeeded => SOLVED_WITHOUT_CHALLENGE,
            _ => "",
        }
    }

    /// 状态名称，用于日志
    pub fn status(&self) -> &'static str {
        match self {
            CaptchaOutcome::Success(_) => "SUCCESS",
            CaptchaOutcome::NoChallengeNeeded => "NO_CHALLENGE_NEEDED",
            CaptchaOutcome::RateLimited => "RATELIMITED",
            CaptchaOutcome::Timeout => "TIMEOUT",
            CaptchaOutcome::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CaptchaOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status())
    }
}
