// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::CaptchaSettings;
use crate::domain::models::captcha_outcome::CaptchaOutcome;
use crate::domain::services::challenge_transcriber::{
    AudioArtifacts, ChallengeTranscriber, TranscriptionError,
};
use crate::engines::locator_chain::LocatorChain;
use crate::engines::traits::{AutomationSession, ElementHandle, Locator, SessionError};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// 状态机步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStep {
    LocateWidgetFrame,
    ActivateCheckbox,
    CheckImmediateSuccess,
    LocateChallengeFrame,
    ActivateAudioMode,
    LocateDownloadLink,
    FetchAndTranscode,
    Transcribe,
    SubmitAnswer,
    Verify,
}

impl fmt::Display for SolveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 状态机内部失败，最终映射为 `CaptchaOutcome`
#[derive(Error, Debug)]
enum SolveFailure {
    #[error("reCAPTCHA widget frame not found")]
    WidgetFrameAbsent,
    #[error("challenge frame not found by any locator strategy")]
    ChallengeFrameAbsent,
    #[error("timed out waiting for element at step {0}")]
    ElementTimeout(SolveStep),
    #[error("audio download link withheld")]
    RateLimited,
    #[error("download link has no audio url")]
    MissingAudioUrl,
    #[error("session error at step {step}: {source}")]
    Session {
        step: SolveStep,
        source: SessionError,
    },
    #[error("transcription error at step {step}: {source}")]
    Transcription {
        step: SolveStep,
        source: TranscriptionError,
    },
    #[error("could not create audio artifacts: {0}")]
    Artifacts(std::io::Error),
}

impl SolveFailure {
    fn outcome(&self) -> CaptchaOutcome {
        match self {
            SolveFailure::ElementTimeout(_) => CaptchaOutcome::Timeout,
            SolveFailure::RateLimited => CaptchaOutcome::RateLimited,
            _ => CaptchaOutcome::Unknown,
        }
    }
}

/// reCAPTCHA 元素定位器
#[derive(Debug, Clone)]
pub struct CaptchaSelectors {
    pub widget_frame: Locator,
    pub checkbox: Locator,
    pub response_token: Locator,
    pub audio_button: Locator,
    pub download_link: Locator,
    pub answer_input: Locator,
    pub verify_button: Locator,
}

impl Default for CaptchaSelectors {
    fn default() -> Self {
        Self {
            widget_frame: Locator::css(r#"iframe[title="reCAPTCHA"]"#),
            checkbox: Locator::css(".recaptcha-checkbox-border"),
            response_token: Locator::css("#g-recaptcha-response"),
            audio_button: Locator::css("#recaptcha-audio-button"),
            download_link: Locator::css(".rc-audiochallenge-tdownload-link"),
            answer_input: Locator::css("#audio-response"),
            verify_button: Locator::css("#recaptcha-verify-button"),
        }
    }
}

/// 求解过程中的等待时间
///
/// `wait_timeout` 是默认的单次元素等待上限；其余为控件内部动画/校验所需的固定等待
#[derive(Debug, Clone)]
pub struct SolverTiming {
    pub wait_timeout: Duration,
    pub checkbox_settle: Duration,
    pub challenge_settle: Duration,
    pub audio_settle: Duration,
    pub answer_settle: Duration,
    pub verify_settle: Duration,
}

impl From<&CaptchaSettings> for SolverTiming {
    fn from(settings: &CaptchaSettings) -> Self {
        Self {
            wait_timeout: settings.wait_timeout(),
            checkbox_settle: Duration::from_millis(settings.checkbox_settle_ms),
            challenge_settle: Duration::from_millis(settings.challenge_settle_ms),
            audio_settle: Duration::from_millis(settings.audio_settle_ms),
            answer_settle: Duration::from_millis(settings.answer_settle_ms),
            verify_settle: Duration::from_millis(settings.verify_settle_ms),
        }
    }
}

/// 验证码求解器
///
/// 从页面上的 reCAPTCHA 复选框出发，必要时走完音频挑战流程，返回 `CaptchaOutcome`。
/// 内部失败全部被吸收为结果变体，不会向调用方抛出错误。
pub struct CaptchaSolver {
    transcriber: Arc<dyn ChallengeTranscriber>,
    selectors: CaptchaSelectors,
    challenge_frames: LocatorChain,
    timing: SolverTiming,
    artifact_root: PathBuf,
}

impl CaptchaSolver {
    pub fn new(
        transcriber: Arc<dyn ChallengeTranscriber>,
        timing: SolverTiming,
        artifact_root: PathBuf,
    ) -> Self {
        Self {
            transcriber,
            selectors: CaptchaSelectors::default(),
            challenge_frames: LocatorChain::challenge_frame(),
            timing,
            artifact_root,
        }
    }

    pub fn with_selectors(mut self, selectors: CaptchaSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_challenge_frames(mut self, chain: LocatorChain) -> Self {
        self.challenge_frames = chain;
        self
    }

    /// 求解页面上的验证码
    ///
    /// # 参数
    ///
    /// * `session` - 已位于目标页面的自动化会话
    /// * `timeout` - 每一次元素等待的上限
    ///
    /// # 返回值
    ///
    /// 终态 `CaptchaOutcome`。无论结果如何，返回前都会切回顶层文档并删除临时音频文件。
    pub async fn solve(&self, session: &dyn AutomationSession, timeout: Duration) -> CaptchaOutcome {
        info!("Attempting to solve captcha...");
        let mut artifacts: Option<AudioArtifacts> = None;

        let result = AssertUnwindSafe(self.drive(session, timeout, &mut artifacts))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(failure)) => {
                let outcome = failure.outcome();
                warn!(status = %outcome, "Captcha not solved: {}", failure);
                outcome
            }
            Err(_) => {
                error!("Captcha solver panicked");
                CaptchaOutcome::Unknown
            }
        };

        self.cleanup(session, artifacts).await;
        info!(status = %outcome, "Captcha solve finished");
        outcome
    }

    /// 使用配置的等待上限求解
    pub async fn solve_default(&self, session: &dyn AutomationSession) -> CaptchaOutcome {
        self.solve(session, self.timing.wait_timeout).await
    }

    async fn drive(
        &self,
        session: &dyn AutomationSession,
        timeout: Duration,
        artifacts: &mut Option<AudioArtifacts>,
    ) -> Result<CaptchaOutcome, SolveFailure> {
        debug!(step = %SolveStep::LocateWidgetFrame, "Looking for reCAPTCHA frame");
        let widget = match session.locate(&self.selectors.widget_frame, timeout).await {
            Ok(element) => element,
            Err(e) if e.is_timeout() => return Err(SolveFailure::WidgetFrameAbsent),
            Err(e) => return Err(at(SolveStep::LocateWidgetFrame)(e)),
        };

        debug!(step = %SolveStep::ActivateCheckbox, "Clicking checkbox");
        session
            .switch_to_frame(&widget)
            .await
            .map_err(at(SolveStep::ActivateCheckbox))?;
        let checkbox = self
            .wait_for(session, timeout, SolveStep::ActivateCheckbox, &self.selectors.checkbox)
            .await?;
        session
            .click(&checkbox)
            .await
            .map_err(at(SolveStep::ActivateCheckbox))?;
        tokio::time::sleep(self.timing.checkbox_settle).await;

        debug!(step = %SolveStep::CheckImmediateSuccess, "Checking response token");
        session
            .switch_to_top_level()
            .await
            .map_err(at(SolveStep::CheckImmediateSuccess))?;
        if self.token_populated(session).await? {
            info!("Captcha passed without an audio challenge");
            return Ok(CaptchaOutcome::NoChallengeNeeded);
        }

        debug!(step = %SolveStep::LocateChallengeFrame, "Looking for challenge frame");
        tokio::time::sleep(self.timing.challenge_settle).await;
        let challenge = self
            .challenge_frames
            .first_match(session, timeout)
            .await
            .ok_or(SolveFailure::ChallengeFrameAbsent)?;

        debug!(step = %SolveStep::ActivateAudioMode, "Switching to audio challenge");
        session
            .switch_to_frame(&challenge)
            .await
            .map_err(at(SolveStep::ActivateAudioMode))?;
        let audio_button = self
            .wait_for(session, timeout, SolveStep::ActivateAudioMode, &self.selectors.audio_button)
            .await?;
        session
            .click(&audio_button)
            .await
            .map_err(at(SolveStep::ActivateAudioMode))?;
        tokio::time::sleep(self.timing.audio_settle).await;

        debug!(step = %SolveStep::LocateDownloadLink, "Looking for download link");
        let link = match session.locate(&self.selectors.download_link, timeout).await {
            Ok(element) => element,
            Err(e) if e.is_timeout() => return Err(SolveFailure::RateLimited),
            Err(e) => return Err(at(SolveStep::LocateDownloadLink)(e)),
        };
        let audio_url = session
            .read_attribute(&link, "href")
            .await
            .map_err(at(SolveStep::LocateDownloadLink))?
            .filter(|href| !href.trim().is_empty())
            .ok_or(SolveFailure::MissingAudioUrl)?;

        debug!(step = %SolveStep::FetchAndTranscode, "Downloading challenge audio");
        let scoped = artifacts.insert(
            AudioArtifacts::create_in(&self.artifact_root).map_err(SolveFailure::Artifacts)?,
        );
        self.transcriber
            .fetch_and_transcode(&audio_url, scoped)
            .await
            .map_err(|source| SolveFailure::Transcription {
                step: SolveStep::FetchAndTranscode,
                source,
            })?;

        debug!(step = %SolveStep::Transcribe, "Recognizing speech");
        let text = self
            .transcriber
            .recognize(scoped)
            .await
            .map_err(|source| SolveFailure::Transcription {
                step: SolveStep::Transcribe,
                source,
            })?;
        info!("Recognized text: {}", text);

        debug!(step = %SolveStep::SubmitAnswer, "Entering answer");
        let input = self
            .wait_for(session, timeout, SolveStep::SubmitAnswer, &self.selectors.answer_input)
            .await?;
        session
            .send_keys(&input, &text)
            .await
            .map_err(at(SolveStep::SubmitAnswer))?;
        tokio::time::sleep(self.timing.answer_settle).await;

        debug!(step = %SolveStep::Verify, "Clicking verify");
        let verify = self
            .wait_for(session, timeout, SolveStep::Verify, &self.selectors.verify_button)
            .await?;
        session
            .click(&verify)
            .await
            .map_err(at(SolveStep::Verify))?;
        tokio::time::sleep(self.timing.verify_settle).await;

        Ok(CaptchaOutcome::Success(text))
    }

    async fn wait_for(
        &self,
        session: &dyn AutomationSession,
        timeout: Duration,
        step: SolveStep,
        locator: &Locator,
    ) -> Result<ElementHandle, SolveFailure> {
        session
            .locate(locator, timeout)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SolveFailure::ElementTimeout(step)
                } else {
                    at(step)(e)
                }
            })
    }

    /// 隐藏的响应令牌是否已被填充
    async fn token_populated(&self, session: &dyn AutomationSession) -> Result<bool, SolveFailure> {
        let tokens = session
            .locate_all(&self.selectors.response_token)
            .await
            .map_err(at(SolveStep::CheckImmediateSuccess))?;
        let Some(token) = tokens.first() else {
            return Ok(false);
        };
        let value = session
            .read_attribute(token, "value")
            .await
            .map_err(at(SolveStep::CheckImmediateSuccess))?;
        Ok(value.is_some_and(|v| !v.trim().is_empty()))
    }

    /// 收尾：切回顶层文档并删除临时文件，自身的失败只记录日志
    async fn cleanup(&self, session: &dyn AutomationSession, artifacts: Option<AudioArtifacts>) {
        if let Err(e) = session.switch_to_top_level().await {
            warn!("Error switching back to top-level document: {}", e);
        }
        if let Some(artifacts) = artifacts {
            let dir = artifacts.dir().to_path_buf();
            match artifacts.remove() {
                Ok(()) => debug!("Removed captcha artifacts in {}", dir.display()),
                Err(e) => warn!("Failed to remove captcha artifacts in {}: {}", dir.display(), e),
            }
        }
    }
}

fn at(step: SolveStep) -> impl Fn(SessionError) -> SolveFailure {
    move |source| SolveFailure::Session { step, source }
}
