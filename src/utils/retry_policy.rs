// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::ScrapeSettings;
use crate::domain::models::captcha_outcome::CaptchaOutcome;
use std::time::Duration;

/// 验证码重试策略配置
///
/// 默认不重试：每个标识号在一次运行中只求解一次验证码
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数（不含首次尝试）
    pub max_retries: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// 单次尝试，不重试
    pub fn single_attempt() -> Self {
        Self::default()
    }

    /// 由抓取配置创建：`captcha_attempts` 为总尝试次数
    pub fn from_settings(settings: &ScrapeSettings) -> Self {
        Self {
            max_retries: settings.captcha_attempts.saturating_sub(1),
            initial_backoff: Duration::from_millis(settings.retry_backoff_ms),
            ..Self::default()
        }
    }

    /// 总尝试次数
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// 计算第 `attempt` 次重试（从 1 开始）前的退避时间
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff_secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // 限制最大退避时间
        let capped_backoff = backoff_secs.min(self.max_backoff.as_secs_f64());

        let final_backoff = if self.enable_jitter && capped_backoff > 0.0 {
            let jitter_range = capped_backoff * self.jitter_factor;
            if jitter_range > 0.0 {
                let jitter = rand::random_range(-jitter_range..jitter_range);
                (capped_backoff + jitter).max(0.0)
            } else {
                capped_backoff
            }
        } else {
            capped_backoff
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 针对上一次结果的退避时间；被限流时多退避一个乘数
    pub fn backoff_after(&self, attempt: u32, outcome: &CaptchaOutcome) -> Duration {
        match outcome {
            CaptchaOutcome::RateLimited => self.calculate_backoff(attempt + 1),
            _ => self.calculate_backoff(attempt),
        }
    }

    /// 是否应该重试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// 根据上一次结果判断是否应该重试
    pub fn should_retry_outcome(&self, attempt: u32, outcome: &CaptchaOutcome) -> bool {
        !outcome.is_solved() && self.should_retry(attempt)
    }
}
