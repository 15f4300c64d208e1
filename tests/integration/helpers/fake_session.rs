// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use taxrs::engines::traits::{AutomationSession, ElementHandle, Locator, SessionError, SessionFactory};

pub const WIDGET_FRAME: &str = r#"css=iframe[title="reCAPTCHA"]"#;
pub const TITLED_CHALLENGE: &str = r#"css=iframe[title="recaptcha challenge"]"#;
pub const PREFIXED_CHALLENGE: &str = r#"css=iframe[name^="c-"]"#;
pub const AUDIO_URL: &str = "https://audio.example/challenge.mp3";

/// 挑战框架在页面上的呈现方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeFrame {
    Titled,
    NamePrefixed,
    ScanOnly,
    Absent,
}

/// 提交后的结果页
#[derive(Debug, Clone)]
pub enum Results {
    /// 结果页 HTML，`{bin}` 会被替换为输入的标识号
    Page(String),
    NotFound,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    Driver,
    Panic,
}

/// 脚本化页面
#[derive(Debug, Clone)]
pub struct Scenario {
    pub widget_present: bool,
    pub token_after_checkbox: bool,
    pub challenge: ChallengeFrame,
    pub download_link: bool,
    pub results: Results,
}

impl Scenario {
    /// 需要完整音频挑战、结果页不含财务行的场景
    pub fn audio_challenge() -> Self {
        Self {
            widget_present: true,
            token_after_checkbox: false,
            challenge: ChallengeFrame::Titled,
            download_link: true,
            results: Results::Page(results_page(&[])),
        }
    }

    pub fn no_challenge() -> Self {
        Self {
            token_after_checkbox: true,
            ..Self::audio_challenge()
        }
    }
}

/// 结果页 HTML，财务行为 (标签, 单元格)
pub fn results_page(financial_rows: &[(&str, &[&str])]) -> String {
    let rows: String = financial_rows
        .iter()
        .map(|(label, cells)| {
            let cells: String = cells.iter().map(|c| format!("<td>{}</td>", c)).collect();
            format!("<tr><td>{}</td>{}</tr>", label, cells)
        })
        .collect();
    format!(
        r#"<html><body><div class="results">
        <table class="table table-bordered"><tbody>
          <tr><td>1</td><td>ТОО Пример</td><td>ТОО</td><td>600400123456</td><td>{{bin}}</td><td>05.03.2019</td></tr>
        </tbody></table>
        <table class="table table-taxpayment"><tbody>{}</tbody></table>
        </div></body></html>"#,
        rows
    )
}

#[derive(Default)]
struct State {
    current: String,
    checkbox_clicked: bool,
    audio_mode: bool,
    submitted: bool,
    typed_bin: String,
    /// 调用记录 → (还需放过的次数, 失败)
    failures: HashMap<String, (usize, Failure)>,
    calls: Vec<String>,
    typed: Vec<(String, String)>,
    screenshots: Vec<PathBuf>,
}

/// 内存中的自动化会话
///
/// 没有真实等待：缺失的元素立即返回超时
pub struct FakeSession {
    scenario: Scenario,
    state: Mutex<State>,
}

impl FakeSession {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            state: Mutex::new(State {
                current: "top".to_string(),
                ..State::default()
            }),
        }
    }

    pub fn shared(scenario: Scenario) -> Arc<Self> {
        Arc::new(Self::new(scenario))
    }

    /// 在调用记录第一次等于 `call` 时注入一次失败
    pub fn fail_on(&self, call: impl Into<String>, failure: Failure) {
        self.fail_on_nth(call, 1, failure);
    }

    /// 在调用记录第 `nth` 次（从 1 开始）等于 `call` 时注入一次失败
    pub fn fail_on_nth(&self, call: impl Into<String>, nth: usize, failure: Failure) {
        self.state
            .lock()
            .failures
            .insert(call.into(), (nth.saturating_sub(1), failure));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().typed.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().screenshots.clone()
    }

    pub fn current_frame(&self) -> String {
        self.state.lock().current.clone()
    }

    fn call(&self, entry: String) -> Result<(), SessionError> {
        let failure = {
            let mut state = self.state.lock();
            state.calls.push(entry.clone());
            let due = match state.failures.get_mut(&entry) {
                Some((remaining, _)) if *remaining > 0 => {
                    *remaining -= 1;
                    false
                }
                Some(_) => true,
                None => false,
            };
            if due {
                state.failures.remove(&entry).map(|(_, failure)| failure)
            } else {
                None
            }
        };
        match failure {
            None => Ok(()),
            Some(Failure::Timeout) => Err(SessionError::Timeout {
                locator: entry,
                timeout: Duration::ZERO,
            }),
            Some(Failure::Driver) => Err(SessionError::driver(format!("injected failure at {}", entry))),
            Some(Failure::Panic) => panic!("injected panic at {}", entry),
        }
    }

    fn lookup(&self, locator: &Locator) -> Vec<String> {
        let state = self.state.lock();
        let key = locator.to_string();
        let scenario = &self.scenario;
        let submitted_page = state.submitted && matches!(scenario.results, Results::Page(_));

        let found: &[&str] = match (state.current.as_str(), key.as_str()) {
            ("top", WIDGET_FRAME) if scenario.widget_present => &["frame:widget"],
            ("top", "css=#g-recaptcha-response") => &["token"],
            ("top", TITLED_CHALLENGE)
                if state.checkbox_clicked && scenario.challenge == ChallengeFrame::Titled =>
            {
                &["frame:challenge"]
            }
            ("top", PREFIXED_CHALLENGE)
                if state.checkbox_clicked && scenario.challenge == ChallengeFrame::NamePrefixed =>
            {
                &["frame:challenge"]
            }
            ("top", "css=iframe") => {
                if state.checkbox_clicked && scenario.challenge != ChallengeFrame::Absent {
                    &["frame:widget", "frame:challenge"]
                } else {
                    &["frame:widget"]
                }
            }
            ("top", "css=#edit-uin-biniin-1") => &["bin-input"],
            ("top", "css=#edit-submit-1") => &["submit"],
            ("top", "css=div.results") if submitted_page => &["results"],
            ("top", "css=table.table-bordered") if submitted_page => &["identity"],
            ("top", k)
                if k.starts_with("xpath=")
                    && state.submitted
                    && matches!(scenario.results, Results::NotFound) =>
            {
                &["not-found"]
            }
            ("widget", "css=.recaptcha-checkbox-border") => &["checkbox"],
            ("challenge", "css=#recaptcha-audio-button") => &["audio-button"],
            ("challenge", "css=.rc-audiochallenge-tdownload-link")
                if state.audio_mode && scenario.download_link =>
            {
                &["download-link"]
            }
            ("challenge", "css=#audio-response") if state.audio_mode => &["answer"],
            ("challenge", "css=#recaptcha-verify-button") => &["verify"],
            _ => &[],
        };
        found.iter().map(|s| s.to_string()).collect()
    }
}

#[async_trait]
impl AutomationSession for FakeSession {
    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        self.call(format!("navigate {}", url))?;
        let mut state = self.state.lock();
        state.current = "top".to_string();
        state.checkbox_clicked = false;
        state.audio_mode = false;
        state.submitted = false;
        Ok(())
    }

    async fn locate(&self, locator: &Locator, timeout: Duration) -> Result<ElementHandle, SessionError> {
        self.call(format!("locate {}", locator))?;
        self.lookup(locator)
            .into_iter()
            .next()
            .map(ElementHandle::new)
            .ok_or_else(|| SessionError::Timeout {
                locator: locator.to_string(),
                timeout,
            })
    }

    async fn locate_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, SessionError> {
        self.call(format!("locate_all {}", locator))?;
        Ok(self.lookup(locator).into_iter().map(ElementHandle::new).collect())
    }

    async fn switch_to_frame(&self, frame: &ElementHandle) -> Result<(), SessionError> {
        self.call(format!("switch_to_frame {}", frame.id()))?;
        let name = frame
            .id()
            .strip_prefix("frame:")
            .ok_or_else(|| SessionError::StaleElement(frame.id().to_string()))?;
        self.state.lock().current = name.to_string();
        Ok(())
    }

    async fn switch_to_top_level(&self) -> Result<(), SessionError> {
        self.call("switch_to_top_level".to_string())?;
        self.state.lock().current = "top".to_string();
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), SessionError> {
        self.call(format!("click {}", element.id()))?;
        let mut state = self.state.lock();
        match element.id() {
            "checkbox" => state.checkbox_clicked = true,
            "audio-button" => state.audio_mode = true,
            "submit" => state.submitted = true,
            _ => {}
        }
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), SessionError> {
        self.call(format!("clear {}", element.id()))?;
        if element.id() == "bin-input" {
            self.state.lock().typed_bin.clear();
        }
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), SessionError> {
        self.call(format!("send_keys {}", element.id()))?;
        let mut state = self.state.lock();
        if element.id() == "bin-input" {
            state.typed_bin.push_str(text);
        }
        state.typed.push((element.id().to_string(), text.to_string()));
        Ok(())
    }

    async fn read_attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>, SessionError> {
        self.call(format!("read_attribute {} {}", element.id(), name))?;
        let state = self.state.lock();
        let value = match (element.id(), name) {
            ("token", "value") if state.checkbox_clicked && self.scenario.token_after_checkbox => {
                Some("03AGdBq2-token".to_string())
            }
            ("token", "value") => Some(String::new()),
            ("download-link", "href") => Some(AUDIO_URL.to_string()),
            ("frame:widget", "title") => Some("reCAPTCHA".to_string()),
            ("frame:challenge", "title") => Some("recaptcha challenge expires in two minutes".to_string()),
            _ => None,
        };
        Ok(value)
    }

    async fn read_text(&self, element: &ElementHandle) -> Result<String, SessionError> {
        self.call(format!("read_text {}", element.id()))?;
        Ok(String::new())
    }

    async fn page_source(&self) -> Result<String, SessionError> {
        self.call("page_source".to_string())?;
        let state = self.state.lock();
        Ok(match &self.scenario.results {
            Results::Page(html) if state.submitted => html.replace("{bin}", &state.typed_bin),
            _ => "<html><body></body></html>".to_string(),
        })
    }

    async fn capture_diagnostic_image(&self, path: &Path) -> Result<(), SessionError> {
        self.call(format!("capture {}", path.display()))?;
        self.state.lock().screenshots.push(path.to_path_buf());
        Ok(())
    }
}

/// 每次创建新的 `FakeSession` 的工厂
pub struct FakeSessionFactory {
    scenario: Scenario,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeSessionFactory {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().clone()
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn create_session(&self) -> Result<Arc<dyn AutomationSession>, SessionError> {
        let session = FakeSession::shared(self.scenario.clone());
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}
