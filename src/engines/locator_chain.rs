// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{AutomationSession, ElementHandle, Locator, SessionError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// 定位策略特质
///
/// 同一语义目标在不同页面布局下的一种表示；找不到返回 `Ok(None)`
#[async_trait]
pub trait LocatorStrategy: Send + Sync {
    async fn find(
        &self,
        session: &dyn AutomationSession,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, SessionError>;

    fn describe(&self) -> String;
}

/// 通过单个定位器等待元素
pub struct WaitFor(pub Locator);

#[async_trait]
impl LocatorStrategy for WaitFor {
    async fn find(
        &self,
        session: &dyn AutomationSession,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, SessionError> {
        match session.locate(&self.0, timeout).await {
            Ok(element) => Ok(Some(element)),
            Err(e) if e.is_timeout() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        self.0.to_string()
    }
}

/// 逐个检查候选元素的属性，属性值（忽略大小写）包含关键字即命中
pub struct ScanAttribute {
    pub candidates: Locator,
    pub attribute: String,
    pub needle: String,
}

#[async_trait]
impl LocatorStrategy for ScanAttribute {
    async fn find(
        &self,
        session: &dyn AutomationSession,
        _timeout: Duration,
    ) -> Result<Option<ElementHandle>, SessionError> {
        let needle = self.needle.to_lowercase();
        for element in session.locate_all(&self.candidates).await? {
            // A single unreadable candidate must not abort the scan.
            match session.read_attribute(&element, &self.attribute).await {
                Ok(Some(value)) if value.to_lowercase().contains(&needle) => {
                    return Ok(Some(element))
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping candidate {}: {}", element.id(), e),
            }
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        format!(
            "scan {} where {} contains {:?}",
            self.candidates, self.attribute, self.needle
        )
    }
}

/// 有序的定位策略链，第一个命中的策略胜出
pub struct LocatorChain {
    strategies: Vec<Box<dyn LocatorStrategy>>,
}

impl LocatorChain {
    pub fn new(strategies: Vec<Box<dyn LocatorStrategy>>) -> Self {
        Self { strategies }
    }

    /// reCAPTCHA 挑战框架的默认策略链：按标题、按名称前缀、最后逐个扫描 iframe 标题
    pub fn challenge_frame() -> Self {
        Self::new(vec![
            Box::new(WaitFor(Locator::css(r#"iframe[title="recaptcha challenge"]"#))),
            Box::new(WaitFor(Locator::css(r#"iframe[name^="c-"]"#))),
            Box::new(ScanAttribute {
                candidates: Locator::css("iframe"),
                attribute: "title".to_string(),
                needle: "challenge".to_string(),
            }),
        ])
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// 依次尝试每个策略
    ///
    /// 策略内部的驱动错误视为未命中，继续尝试下一个策略；全部未命中返回 `None`
    pub async fn first_match(
        &self,
        session: &dyn AutomationSession,
        timeout: Duration,
    ) -> Option<ElementHandle> {
        for strategy in &self.strategies {
            match strategy.find(session, timeout).await {
                Ok(Some(element)) => {
                    debug!("Locator strategy matched: {}", strategy.describe());
                    return Some(element);
                }
                Ok(None) => debug!("Locator strategy missed: {}", strategy.describe()),
                Err(e) => debug!("Locator strategy {} failed: {}", strategy.describe(), e),
            }
        }
        None
    }
}
