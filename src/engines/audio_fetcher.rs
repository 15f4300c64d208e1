// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::engines::traits::{AudioFetcher, FetchError};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// 音频下载器
///
/// 基于reqwest实现，默认跟随重定向
pub struct ReqwestAudioFetcher {
    client: reqwest::Client,
}

impl ReqwestAudioFetcher {
    /// 创建下载器
    ///
    /// # 参数
    ///
    /// * `timeout` - 单次请求超时
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36")
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AudioFetcher for ReqwestAudioFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let start = Instant::now();
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::Empty);
        }

        tracing::debug!(
            "Downloaded {} bytes of challenge audio in {} ms",
            bytes.len(),
            start.elapsed().as_millis()
        );
        Ok(bytes.to_vec())
    }
}
