// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::services::challenge_transcriber::{AudioTranscoder, TranscriptionError};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// 识别服务要求的采样率
pub const SAMPLE_RATE: u32 = 16_000;

/// 基于 ffmpeg 可执行文件的转码器
///
/// 输出 16 kHz 单声道 16 位 PCM WAV
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(input: &Path, output: &Path) -> Vec<String> {
        let rate = SAMPLE_RATE.to_string();
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.display().to_string(),
            "-ac".into(),
            "1".into(),
            "-ar".into(),
            rate,
            "-acodec".into(),
            "pcm_s16le".into(),
            "-f".into(),
            "wav".into(),
            output.display().to_string(),
        ]
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscriptionError> {
        let result = Command::new(&self.binary)
            .args(Self::args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TranscriptionError::Transcode(format!("failed to run {}: {}", self.binary, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TranscriptionError::Transcode(format!(
                "{} exited with {}: {}",
                self.binary,
                result.status,
                stderr.trim()
            )));
        }

        debug!("Transcoded {} to {}", input.display(), output.display());
        Ok(())
    }
}
