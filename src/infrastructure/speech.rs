// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::SpeechSettings;
use crate::domain::services::challenge_transcriber::{SpeechRecognizer, TranscriptionError};
use crate::infrastructure::audio::SAMPLE_RATE;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    #[serde(default)]
    result: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternative: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

/// Google 语音识别客户端
///
/// 以 16 位 PCM 提交音频，响应为逐行 JSON，第一行通常是空结果
pub struct GoogleSpeechRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleSpeechRecognizer {
    /// 创建识别客户端，未配置 `speech.api_key` 时失败
    pub fn new(settings: &SpeechSettings) -> Result<Self, TranscriptionError> {
        let api_key = settings
            .require_api_key()
            .map_err(|e| TranscriptionError::Service(e.to_string()))?
            .to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| TranscriptionError::Service(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key,
        })
    }

    fn parse_transcript(body: &str) -> Option<String> {
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<RecognitionResponse>(line).ok())
            .flat_map(|response| response.result)
            .flat_map(|result| result.alternative)
            .map(|alternative| alternative.transcript.trim().to_string())
            .find(|transcript| !transcript.is_empty())
    }
}

/// 去掉 WAV 头，返回 `data` 块中的 PCM 数据；不是 RIFF/WAVE 时原样返回
pub fn pcm_payload(audio: &[u8]) -> &[u8] {
    if audio.len() < 12 || &audio[0..4] != b"RIFF" || &audio[8..12] != b"WAVE" {
        return audio;
    }

    let mut offset = 12;
    while offset + 8 <= audio.len() {
        let id = &audio[offset..offset + 4];
        let size = u32::from_le_bytes([
            audio[offset + 4],
            audio[offset + 5],
            audio[offset + 6],
            audio[offset + 7],
        ]) as usize;
        let start = offset + 8;
        if id == b"data" {
            let end = start.saturating_add(size).min(audio.len());
            return &audio[start..end];
        }
        // Chunks are word aligned.
        offset = start.saturating_add(size).saturating_add(size % 2);
    }
    &[]
}

#[async_trait]
impl SpeechRecognizer for GoogleSpeechRecognizer {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscriptionError> {
        let pcm = pcm_payload(audio);
        if pcm.is_empty() {
            return Err(TranscriptionError::Unintelligible);
        }

        let query = [
            ("client", "chromium"),
            ("lang", language),
            ("key", self.api_key.as_str()),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .query(&query)
            .header(CONTENT_TYPE, format!("audio/l16; rate={}", SAMPLE_RATE))
            .body(pcm.to_vec())
            .send()
            .await
            .map_err(|e| TranscriptionError::Service(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TranscriptionError::Quota(status.to_string()));
        }
        if !status.is_success() {
            return Err(TranscriptionError::Service(format!(
                "recognition request failed with {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::Service(e.to_string()))?;
        debug!("Recognition response: {} bytes", body.len());

        Self::parse_transcript(&body).ok_or(TranscriptionError::Unintelligible)
    }
}
