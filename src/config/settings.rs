// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::models::entity_record::YearWindow;

/// 应用程序配置设置
///
/// 包含数据库、浏览器、门户页面、验证码、语音识别和抓取流程等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 浏览器配置
    pub browser: BrowserSettings,
    /// 门户页面配置
    pub portal: PortalSettings,
    /// 验证码求解配置
    pub captcha: CaptchaSettings,
    /// 语音识别配置
    pub speech: SpeechSettings,
    /// 抓取流程配置
    pub scrape: ScrapeSettings,
    /// 企业信息补充配置
    pub company_info: CompanyInfoSettings,
}

/// 数据库配置设置
///
/// 优先使用完整的连接URL，否则由 host/port/name/user/password 拼接
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: Option<String>,
    /// 主机地址
    pub host: String,
    /// 端口
    pub port: u16,
    /// 数据库名称
    pub name: String,
    /// 用户名
    pub user: String,
    /// 密码
    pub password: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

impl DatabaseSettings {
    /// 生成数据库连接URL
    pub fn connection_url(&self) -> String {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                let credentials = if self.password.is_empty() {
                    self.user.clone()
                } else {
                    format!("{}:{}", self.user, self.password)
                };
                format!(
                    "postgres://{}@{}:{}/{}",
                    credentials, self.host, self.port, self.name
                )
            }
        }
    }
}

/// 浏览器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    /// 远程调试地址，设置后连接已有浏览器而不是启动新实例
    pub remote_debugging_url: Option<String>,
    /// 是否无头模式
    pub headless: bool,
    /// CDP 请求超时时间（秒）
    pub request_timeout_secs: u64,
    /// 元素轮询间隔（毫秒）
    pub poll_interval_ms: u64,
}

impl BrowserSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// 门户页面配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct PortalSettings {
    /// 查询表单地址
    pub query_url: String,
    /// BIN 输入框选择器
    pub identifier_input: String,
    /// 提交按钮选择器
    pub submit_button: String,
    /// 结果容器选择器
    pub results_container: String,
    /// "无结果"提示文本
    pub not_found_marker: String,
    /// 税款行标签
    pub tax_payment_label: String,
    /// 增值税返还行标签
    pub vat_refund_label: String,
    /// 等待结果页面的超时时间（秒）
    pub results_timeout_secs: u64,
    /// 探测"无结果"提示的超时时间（秒）
    pub not_found_probe_secs: u64,
}

impl PortalSettings {
    pub fn results_timeout(&self) -> Duration {
        Duration::from_secs(self.results_timeout_secs)
    }

    pub fn not_found_probe(&self) -> Duration {
        Duration::from_secs(self.not_found_probe_secs)
    }
}

/// 验证码求解配置设置
///
/// 所有等待时间均为单次元素等待的上限，而不是整个求解过程的总时长
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaSettings {
    /// 单次元素等待超时（秒）
    pub wait_timeout_secs: u64,
    /// 点击复选框后的固定等待（毫秒）
    pub checkbox_settle_ms: u64,
    /// 查找挑战框架前的固定等待（毫秒）
    pub challenge_settle_ms: u64,
    /// 切换音频模式后的固定等待（毫秒）
    pub audio_settle_ms: u64,
    /// 输入答案后的固定等待（毫秒）
    pub answer_settle_ms: u64,
    /// 点击验证后的固定等待（毫秒）
    pub verify_settle_ms: u64,
    /// 临时音频文件根目录，为空时使用系统临时目录
    pub artifact_dir: Option<PathBuf>,
    /// ffmpeg 可执行文件
    pub ffmpeg_binary: String,
}

impl CaptchaSettings {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn artifact_root(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// 语音识别配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechSettings {
    /// 识别服务地址
    pub endpoint: String,
    /// API 密钥
    pub api_key: Option<String>,
    /// 识别语言
    pub language: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

impl SpeechSettings {
    /// 获取 API 密钥
    ///
    /// 识别接口拒绝不带密钥的请求，未配置或为空时返回错误
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::Message(
                "speech.api_key is required (set it in config or TAXRS__SPEECH__API_KEY)"
                    .to_string(),
            )),
        }
    }
}

/// 抓取流程配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeSettings {
    /// 快照CSV文件路径
    pub snapshot_path: PathBuf,
    /// 诊断截图目录
    pub screenshot_dir: PathBuf,
    /// 验证码通过后提交表单前的等待（毫秒）
    pub submit_settle_ms: u64,
    /// 每个BIN的验证码尝试次数，1 表示不重试
    pub captcha_attempts: u32,
    /// 重试初始退避（毫秒）
    pub retry_backoff_ms: u64,
    /// 并行工作者数量
    pub workers: usize,
    /// 财务数据起始年份
    pub first_year: i32,
    /// 财务数据结束年份（包含）
    pub last_year: i32,
}

/// 企业信息补充配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyInfoSettings {
    /// `CompanyFullInfo` 接口地址
    pub endpoint: String,
    /// 接口语言参数
    pub language: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
    /// 相邻请求之间的等待（毫秒）
    pub request_delay_ms: u64,
    /// 税款起始年份
    pub first_year: i32,
    /// 税款结束年份（包含）
    pub last_year: i32,
    /// 输出目录
    pub output_dir: PathBuf,
}

impl CompanyInfoSettings {
    pub fn year_window(&self) -> YearWindow {
        YearWindow::new(self.first_year, self.last_year)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl ScrapeSettings {
    pub fn year_window(&self) -> YearWindow {
        YearWindow::new(self.first_year, self.last_year)
    }

    pub fn submit_settle(&self) -> Duration {
        Duration::from_millis(self.submit_settle_ms)
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加默认值、配置文件、`TAXRS__` 前缀环境变量，
    /// 最后是 `DATABASE_URL` 与 `DB_*` 这类常规数据库环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("TAXRS").separator("__"))
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("database.host", std::env::var("DB_HOST").ok())?
            .set_override_option("database.port", std::env::var("DB_PORT").ok())?
            .set_override_option("database.name", std::env::var("DB_NAME").ok())?
            .set_override_option("database.user", std::env::var("DB_USER").ok())?
            .set_override_option("database.password", std::env::var("DB_PASSWORD").ok())?;

        builder.build()?.try_deserialize()
    }

    /// 仅包含内置默认值的配置
    pub fn with_defaults() -> Result<Self, ConfigError> {
        Self::defaults()?.build()?.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            // Database
            .set_default("database.host", "localhost")?
            .set_default("database.port", 5432)?
            .set_default("database.name", "taxrs")?
            .set_default("database.user", "postgres")?
            .set_default("database.password", "")?
            .set_default("database.max_connections", 5)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Browser
            .set_default("browser.headless", true)?
            .set_default("browser.request_timeout_secs", 30)?
            .set_default("browser.poll_interval_ms", 250)?
            // Portal
            .set_default(
                "portal.query_url",
                "https://kgd.gov.kz/ru/services/taxpayer_search/legal_entity",
            )?
            .set_default("portal.identifier_input", "#edit-uin-biniin-1")?
            .set_default("portal.submit_button", "#edit-submit-1")?
            .set_default("portal.results_container", "div.results")?
            .set_default("portal.not_found_marker", "По вашему запросу ничего не найдено")?
            .set_default("portal.tax_payment_label", "Налоговые поступления")?
            .set_default("portal.vat_refund_label", "сумма возврата превышения НДС")?
            .set_default("portal.results_timeout_secs", 20)?
            .set_default("portal.not_found_probe_secs", 1)?
            // Captcha
            .set_default("captcha.wait_timeout_secs", 20)?
            .set_default("captcha.checkbox_settle_ms", 3000)?
            .set_default("captcha.challenge_settle_ms", 2000)?
            .set_default("captcha.audio_settle_ms", 2000)?
            .set_default("captcha.answer_settle_ms", 2000)?
            .set_default("captcha.verify_settle_ms", 3000)?
            .set_default("captcha.ffmpeg_binary", "ffmpeg")?
            // Speech
            .set_default("speech.endpoint", "http://www.google.com/speech-api/v2/recognize")?
            .set_default("speech.language", "en-US")?
            .set_default("speech.timeout_secs", 30)?
            // Scrape
            .set_default("scrape.snapshot_path", "companies_data.csv")?
            .set_default("scrape.screenshot_dir", ".")?
            .set_default("scrape.submit_settle_ms", 2000)?
            .set_default("scrape.captcha_attempts", 1)?
            .set_default("scrape.retry_backoff_ms", 5000)?
            .set_default("scrape.workers", 1)?
            .set_default("scrape.first_year", 2020)?
            .set_default("scrape.last_year", 2024)?
            // Company info
            .set_default("company_info.endpoint", "https://apiba.prgapp.kz/CompanyFullInfo")?
            .set_default("company_info.language", "ru")?
            .set_default("company_info.timeout_secs", 20)?
            .set_default("company_info.request_delay_ms", 300)?
            .set_default("company_info.first_year", 2021)?
            .set_default("company_info.last_year", 2025)?
            .set_default("company_info.output_dir", "extracted")
    }
}
