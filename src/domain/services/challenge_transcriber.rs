// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{AudioFetcher, FetchError};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

/// 转写错误类型
#[derive(Error, Debug)]
pub enum TranscriptionError {
    /// 下载音频失败
    #[error("Audio fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// 文件读写失败
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// 转码失败
    #[error("Transcode failed: {0}")]
    Transcode(String),
    /// 音频无法识别
    #[error("Audio could not be understood")]
    Unintelligible,
    /// 配额耗尽或被拒绝
    #[error("Recognition quota exceeded: {0}")]
    Quota(String),
    /// 识别服务其他错误
    #[error("Recognition service error: {0}")]
    Service(String),
}

/// 单次求解的临时音频文件
///
/// 两个文件位于本次调用独占的临时目录中，`remove` 或 drop 时整个目录被删除
#[derive(Debug)]
pub struct AudioArtifacts {
    dir: TempDir,
    compressed: PathBuf,
    decoded: PathBuf,
}

impl AudioArtifacts {
    /// 在 `root` 下创建独占的临时目录
    pub fn create_in(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix("captcha-")
            .tempdir_in(root)?;
        let compressed = dir.path().join("challenge.mp3");
        let decoded = dir.path().join("challenge.wav");
        Ok(Self {
            dir,
            compressed,
            decoded,
        })
    }

    /// 压缩音频（下载原文件）路径
    pub fn compressed_path(&self) -> &Path {
        &self.compressed
    }

    /// 解码后音频路径
    pub fn decoded_path(&self) -> &Path {
        &self.decoded
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// 删除临时目录及其中的文件
    pub fn remove(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// 音频转码特质：压缩音频文件 → 识别服务要求的格式
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscriptionError>;
}

/// 语音识别特质
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// 识别音频，无法识别或配额耗尽时返回错误
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError>;
}

/// 挑战音频转写特质
///
/// 音频地址 → 识别文本；中间文件写入调用方提供的 `AudioArtifacts`
#[async_trait]
pub trait ChallengeTranscriber: Send + Sync {
    /// 下载音频到压缩文件并转码到解码文件
    async fn fetch_and_transcode(
        &self,
        audio_url: &str,
        artifacts: &AudioArtifacts,
    ) -> Result<(), TranscriptionError>;

    /// 识别解码文件中的语音
    async fn recognize(&self, artifacts: &AudioArtifacts) -> Result<String, TranscriptionError>;

    /// 完整的一次转写
    async fn transcribe(
        &self,
        audio_url: &str,
        artifacts: &AudioArtifacts,
    ) -> Result<String, TranscriptionError> {
        self.fetch_and_transcode(audio_url, artifacts).await?;
        self.recognize(artifacts).await
    }
}

/// 由下载器、转码器和识别器组合而成的转写器
pub struct AudioChallengeTranscriber {
    fetcher: Arc<dyn AudioFetcher>,
    transcoder: Arc<dyn AudioTranscoder>,
    recognizer: Arc<dyn SpeechRecognizer>,
    language: String,
}

impl AudioChallengeTranscriber {
    pub fn new(
        fetcher: Arc<dyn AudioFetcher>,
        transcoder: Arc<dyn AudioTranscoder>,
        recognizer: Arc<dyn SpeechRecognizer>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            recognizer,
            language: language.into(),
        }
    }
}

#[async_trait]
impl ChallengeTranscriber for AudioChallengeTranscriber {
    async fn fetch_and_transcode(
        &self,
        audio_url: &str,
        artifacts: &AudioArtifacts,
    ) -> Result<(), TranscriptionError> {
        let audio = self.fetcher.fetch(audio_url).await?;
        tokio::fs::write(artifacts.compressed_path(), &audio).await?;
        debug!(
            "Saved {} bytes to {}",
            audio.len(),
            artifacts.compressed_path().display()
        );
        self.transcoder
            .transcode(artifacts.compressed_path(), artifacts.decoded_path())
            .await
    }

    async fn recognize(&self, artifacts: &AudioArtifacts) -> Result<String, TranscriptionError> {
        let audio = tokio::fs::read(artifacts.decoded_path()).await?;
        let text = self.recognizer.transcribe(&audio, &self.language).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(TranscriptionError::Unintelligible);
        }
        Ok(text.to_string())
    }
}
