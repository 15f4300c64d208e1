// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::BrowserSettings;
use crate::engines::traits::{
    AutomationSession, ElementHandle, Locator, SessionError, SessionFactory,
};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, FrameId};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const REF_ATTRIBUTE: &str = "data-taxrs-ref";

/// 浏览器实例
///
/// 基于 chromiumoxide 启动本地 Chrome 或连接远程调试地址，
/// 每个会话对应一个独立的页面
pub struct ChromiumBrowser {
    browser: tokio::sync::Mutex<Browser>,
    handler: JoinHandle<()>,
    poll_interval: Duration,
}

impl ChromiumBrowser {
    /// 启动或连接浏览器
    ///
    /// # 参数
    ///
    /// * `settings` - 浏览器配置
    ///
    /// # 返回值
    ///
    /// * `Ok(ChromiumBrowser)` - 可用于创建会话的浏览器
    /// * `Err(SessionError)` - 启动或连接失败
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, SessionError> {
        let (browser, mut handler) = if let Some(url) = settings.remote_debugging_url.as_deref() {
            tracing::info!("Connecting to remote Chrome instance at: {}", url);
            Browser::connect(url).await.map_err(|e| {
                SessionError::Driver(format!("Failed to connect to remote Chrome: {}", e))
            })?
        } else {
            let mut builder = BrowserConfig::builder()
                .no_sandbox()
                .request_timeout(settings.request_timeout())
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                // Keep cross-origin iframes in-process so their execution contexts are reachable.
                .arg("--disable-site-isolation-trials")
                .arg("--disable-features=IsolateOrigins,site-per-process");
            if !settings.headless {
                builder = builder.with_head();
            }
            let config = builder.build().map_err(SessionError::Driver)?;
            Browser::launch(config).await.map_err(SessionError::driver)?
        };

        // Spawn a handler to process browser events
        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            handler,
            poll_interval: settings.poll_interval(),
        })
    }

    /// 打开一个新页面作为自动化会话
    pub async fn new_session(&self) -> Result<ChromiumSession, SessionError> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(SessionError::driver)?;
        Ok(ChromiumSession::new(page, self.poll_interval))
    }

    /// 关闭浏览器
    pub async fn shutdown(self) {
        let mut browser = self.browser.into_inner();
        if let Err(e) = browser.close().await {
            tracing::warn!("Failed to close browser cleanly: {}", e);
        }
        let _ = browser.wait().await;
        self.handler.abort();
        tracing::info!("Browser closed.");
    }
}

#[async_trait]
impl SessionFactory for ChromiumBrowser {
    async fn create_session(&self) -> Result<Arc<dyn AutomationSession>, SessionError> {
        Ok(Arc::new(self.new_session().await?))
    }
}

#[derive(Default)]
struct SessionState {
    current_frame: Option<FrameId>,
    // element ref -> frame the element lives in (None = top level)
    elements: HashMap<String, Option<FrameId>>,
}

/// Chrome 页面上的自动化会话
///
/// 通过在当前框架的执行上下文中执行脚本实现元素定位与交互，
/// 找到的元素被打上 `data-taxrs-ref` 标记，句柄即标记值
pub struct ChromiumSession {
    page: Page,
    poll_interval: Duration,
    state: Mutex<SessionState>,
    lookups: AtomicU64,
}

impl ChromiumSession {
    pub fn new(page: Page, poll_interval: Duration) -> Self {
        Self {
            page,
            poll_interval,
            state: Mutex::new(SessionState::default()),
            lookups: AtomicU64::new(0),
        }
    }

    async fn evaluate(&self, frame: Option<&FrameId>, script: String) -> Result<Value, SessionError> {
        let mut builder = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true);

        if let Some(frame_id) = frame {
            let context = self
                .page
                .frame_execution_context(frame_id.clone())
                .await
                .map_err(SessionError::driver)?
                .ok_or_else(|| {
                    SessionError::Driver(format!("Frame {:?} has no execution context", frame_id))
                })?;
            builder = builder.context_id(context);
        }

        let params = builder.build().map_err(SessionError::Driver)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(SessionError::driver)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    fn current_frame(&self) -> Option<FrameId> {
        self.state.lock().current_frame.clone()
    }

    fn frame_of(&self, element: &ElementHandle) -> Result<Option<FrameId>, SessionError> {
        self.state
            .lock()
            .elements
            .get(element.id())
            .cloned()
            .ok_or_else(|| SessionError::StaleElement(element.id().to_string()))
    }

    /// 在当前框架中查找元素并打上标记
    async fn find(&self, locator: &Locator, limit: usize) -> Result<Vec<ElementHandle>, SessionError> {
        let frame = self.current_frame();
        let prefix = format!("r{}-", self.lookups.fetch_add(1, Ordering::Relaxed));
        let collect = match locator {
            Locator::Css(selector) => format!(
                "document.querySelectorAll({}).forEach(e => found.push(e));",
                js_string(selector)
            ),
            Locator::XPath(expression) => format!(
                "const snap = document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                 for (let i = 0; i < snap.snapshotLength; i++) {{
                     const node = snap.snapshotItem(i);
                     if (node.nodeType === 1) found.push(node);
                 }}",
                js_string(expression)
            ),
        };
        let script = format!(
            "(() => {{
                const found = [];
                {collect}
                return found.slice(0, {limit}).map((el, i) => {{
                    if (!el.getAttribute('{attr}')) el.setAttribute('{attr}', {prefix} + i);
                    return el.getAttribute('{attr}');
                }});
            }})()",
            collect = collect,
            limit = limit,
            attr = REF_ATTRIBUTE,
            prefix = js_string(&prefix),
        );

        let refs: Vec<String> = serde_json::from_value(self.evaluate(frame.as_ref(), script).await?)
            .map_err(SessionError::driver)?;

        let mut state = self.state.lock();
        Ok(refs
            .into_iter()
            .map(|id| {
                state.elements.insert(id.clone(), frame.clone());
                ElementHandle::new(id)
            })
            .collect())
    }

    /// 在元素所在框架中以 `el` 为变量执行脚本片段
    async fn with_element(&self, element: &ElementHandle, body: &str) -> Result<Value, SessionError> {
        let frame = self.frame_of(element)?;
        let script = format!(
            "(() => {{
                const el = document.querySelector('[{attr}=' + JSON.stringify({id}) + ']');
                if (!el) return {{ stale: true }};
                return {{ stale: false, value: (() => {{ {body} }})() }};
            }})()",
            attr = REF_ATTRIBUTE,
            id = js_string(element.id()),
            body = body,
        );
        let result = self.evaluate(frame.as_ref(), script).await?;
        if result.get("stale").and_then(Value::as_bool).unwrap_or(true) {
            return Err(SessionError::StaleElement(element.id().to_string()));
        }
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn resolve_frame_id(&self, name: &str, src: &str) -> Result<FrameId, SessionError> {
        let frames = self.page.frames().await.map_err(SessionError::driver)?;
        for frame_id in &frames {
            if !name.is_empty() {
                let frame_name = self
                    .page
                    .frame_name(frame_id.clone())
                    .await
                    .map_err(SessionError::driver)?;
                if frame_name.as_deref() == Some(name) {
                    return Ok(frame_id.clone());
                }
            }
        }
        for frame_id in &frames {
            if !src.is_empty() {
                let frame_url = self
                    .page
                    .frame_url(frame_id.clone())
                    .await
                    .map_err(SessionError::driver)?;
                if frame_url.as_deref() == Some(src) {
                    return Ok(frame_id.clone());
                }
            }
        }
        Err(SessionError::Driver(format!(
            "No frame matches name {:?} / src {:?}",
            name, src
        )))
    }
}

#[async_trait]
impl AutomationSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        self.page.goto(url).await.map_err(SessionError::driver)?;
        let mut state = self.state.lock();
        state.current_frame = None;
        state.elements.clear();
        Ok(())
    }

    async fn locate(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SessionError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.find(locator, 1).await?.into_iter().next() {
                return Ok(element);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SessionError::Timeout {
                    locator: locator.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn locate_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, SessionError> {
        self.find(locator, 1000).await
    }

    async fn switch_to_frame(&self, frame: &ElementHandle) -> Result<(), SessionError> {
        let info = self
            .with_element(
                frame,
                "return { name: el.getAttribute('name') || '', src: el.src || el.getAttribute('src') || '' };",
            )
            .await?;
        let name = info.get("name").and_then(Value::as_str).unwrap_or_default();
        let src = info.get("src").and_then(Value::as_str).unwrap_or_default();
        let frame_id = self.resolve_frame_id(name, src).await?;
        self.state.lock().current_frame = Some(frame_id);
        Ok(())
    }

    async fn switch_to_top_level(&self) -> Result<(), SessionError> {
        self.state.lock().current_frame = None;
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), SessionError> {
        // Script click, the widget ignores synthetic mouse events on covered elements.
        self.with_element(element, "el.click(); return true;").await?;
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), SessionError> {
        self.with_element(
            element,
            "el.value = ''; el.dispatchEvent(new Event('input', { bubbles: true })); return true;",
        )
        .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), SessionError> {
        self.with_element(element, "el.focus(); return true;").await?;
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .map_err(SessionError::driver)?;
        Ok(())
    }

    async fn read_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        let body = format!(
            "const name = {name};
             const prop = el[name];
             if (typeof prop === 'string') return prop;
             return el.getAttribute(name);",
            name = js_string(name)
        );
        let value = self.with_element(element, &body).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn read_text(&self, element: &ElementHandle) -> Result<String, SessionError> {
        let value = self
            .with_element(element, "return (el.innerText || el.textContent || '').trim();")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn page_source(&self) -> Result<String, SessionError> {
        self.page.content().await.map_err(SessionError::driver)
    }

    async fn capture_diagnostic_image(&self, path: &Path) -> Result<(), SessionError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .save_screenshot(params, path)
            .await
            .map_err(SessionError::driver)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.page.clone().close().await.map_err(SessionError::driver)
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
