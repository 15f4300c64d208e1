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

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 会话错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// 等待元素超时
    #[error("Timed out after {timeout:?} waiting for {locator}")]
    Timeout { locator: String, timeout: Duration },
    /// 元素句柄已失效（页面跳转或框架切换后）
    #[error("Stale element: {0}")]
    StaleElement(String),
    /// 驱动层错误
    #[error("Driver error: {0}")]
    Driver(String),
}

impl SessionError {
    pub fn driver(error: impl fmt::Display) -> Self {
        SessionError::Driver(error.to_string())
    }

    /// 是否为等待超时
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout { .. })
    }
}

/// 元素定位方式
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// CSS 选择器
    Css(String),
    /// XPath 表达式
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    /// 匹配包含指定文本的任意元素
    pub fn containing_text(text: &str) -> Self {
        Locator::XPath(format!("//*[contains(text(), '{}')]", text.replace('\'', "")))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css={}", selector),
            Locator::XPath(expression) => write!(f, "xpath={}", expression),
        }
    }
}

/// 元素句柄
///
/// 由会话实现分配的不透明引用，只在分配它的会话中有效
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// UI 自动化会话特质
///
/// 验证码求解器、实体提取器和编排器只通过这个接口操作浏览器。
/// 所有方法都作用于当前所在的框架，`switch_to_frame` / `switch_to_top_level` 改变当前框架。
#[async_trait]
pub trait AutomationSession: Send + Sync {
    /// 打开页面，当前框架重置为顶层文档
    async fn navigate(&self, url: &str) -> Result<(), SessionError>;

    /// 在超时前等待元素出现，超时返回 `SessionError::Timeout`
    async fn locate(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError>;

    /// 立即返回当前框架中所有匹配的元素，不等待
    async fn locate_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, SessionError>;

    /// 切换到 iframe 元素对应的框架
    async fn switch_to_frame(&self, frame: &ElementHandle) -> Result<(), SessionError>;

    /// 切换回顶层文档
    async fn switch_to_top_level(&self) -> Result<(), SessionError>;

    /// 点击元素
    async fn click(&self, element: &ElementHandle) -> Result<(), SessionError>;

    /// 清空输入框
    async fn clear(&self, element: &ElementHandle) -> Result<(), SessionError>;

    /// 向元素输入文本
    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), SessionError>;

    /// 读取属性（优先读取同名 DOM 属性值），不存在时返回 `None`
    async fn read_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    /// 读取元素可见文本
    async fn read_text(&self, element: &ElementHandle) -> Result<String, SessionError>;

    /// 顶层文档的 HTML
    async fn page_source(&self) -> Result<String, SessionError>;

    /// 保存诊断截图
    async fn capture_diagnostic_image(&self, path: &Path) -> Result<(), SessionError>;

    /// 关闭会话
    async fn close(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// 会话工厂特质
///
/// 并行模式下每个工作者拥有独立的会话
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create_session(&self) -> Result<std::sync::Arc<dyn AutomationSession>, SessionError>;
}

/// 音频下载特质
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// 跟随重定向下载音频，返回原始字节
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// 音频下载错误
#[derive(Error, Debug)]
pub enum FetchError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 非成功状态码
    #[error("Unexpected status {0}")]
    Status(u16),
    /// 空响应
    #[error("Empty audio payload")]
    Empty,
}
