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

use anyhow::{Context, Result};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::config::settings::Settings;
use crate::domain::models::captcha_outcome::CaptchaOutcome;
use crate::domain::models::entity_record::EntityRecord;
use crate::domain::models::identifier::EntityIdentifier;
use crate::domain::models::scrape_result::ScrapeResult;
use crate::domain::services::captcha_solver::CaptchaSolver;
use crate::domain::services::entity_extractor::EntityExtractor;
use crate::domain::services::persistence_gateway::PersistenceGateway;
use crate::engines::traits::{AutomationSession, Locator};
use crate::utils::retry_policy::RetryPolicy;

/// 内存中的工作集
///
/// 按标识号去重，保持首次出现的顺序；同一标识号的新记录整体替换旧记录
#[derive(Debug, Default, Clone)]
pub struct WorkingSet {
    records: Vec<EntityRecord>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = EntityRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.upsert(record);
        }
        set
    }

    /// 插入或替换记录，返回是否替换了已有记录
    pub fn upsert(&mut self, record: EntityRecord) -> bool {
        match self
            .records
            .iter_mut()
            .find(|existing| existing.identifier == record.identifier)
        {
            Some(existing) => {
                *existing = record;
                true
            }
            None => {
                self.records.push(record);
                false
            }
        }
    }

    pub fn get(&self, identifier: &EntityIdentifier) -> Option<&EntityRecord> {
        self.records.iter().find(|r| &r.identifier == identifier)
    }

    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 多个工作者共享的工作集
///
/// `flush` 让"取快照 + 写快照"串行执行，保证后写入的快照总是更新的
#[derive(Debug, Default)]
pub struct SharedWorkingSet {
    records: parking_lot::Mutex<WorkingSet>,
    flush: tokio::sync::Mutex<()>,
}

impl SharedWorkingSet {
    pub fn new(initial: WorkingSet) -> Self {
        Self {
            records: parking_lot::Mutex::new(initial),
            flush: tokio::sync::Mutex::new(()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<EntityRecord> {
        self.records.lock().records().to_vec()
    }

    pub fn get(&self, identifier: &EntityIdentifier) -> Option<EntityRecord> {
        self.records.lock().get(identifier).cloned()
    }
}

/// 单个标识号的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// 记录已提取并写入工作集；`persisted` 表示两个持久化目标是否都写入成功
    Stored { persisted: bool },
    /// 门户中不存在该企业
    NotFound,
    /// 验证码未通过
    CaptchaFailed(CaptchaOutcome),
    /// 结果页提取失败
    ExtractionFailed(String),
    /// 处理过程中出现未预料的错误
    Error(String),
    /// 标识号无效，未调用任何协作者
    Skipped,
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessOutcome::Stored { persisted: true } => f.write_str("stored"),
            ProcessOutcome::Stored { persisted: false } => f.write_str("stored (persistence failed)"),
            ProcessOutcome::NotFound => f.write_str("not found"),
            ProcessOutcome::CaptchaFailed(outcome) => write!(f, "captcha {}", outcome),
            ProcessOutcome::ExtractionFailed(reason) => write!(f, "extraction failed: {}", reason),
            ProcessOutcome::Error(reason) => write!(f, "error: {}", reason),
            ProcessOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

/// 一次运行的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub not_found: usize,
    pub failed: usize,
    pub skipped: usize,
    pub persistence_failures: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Stored { persisted } => {
                self.succeeded += 1;
                if !persisted {
                    self.persistence_failures += 1;
                }
            }
            ProcessOutcome::NotFound => self.not_found += 1,
            ProcessOutcome::CaptchaFailed(_)
            | ProcessOutcome::ExtractionFailed(_)
            | ProcessOutcome::Error(_) => self.failed += 1,
            ProcessOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.succeeded += other.succeeded;
        self.not_found += other.not_found;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.persistence_failures += other.persistence_failures;
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.not_found + self.failed + self.skipped
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed: {} succeeded, {} not found, {} failed, {} skipped, {} persistence failures",
            self.total(),
            self.succeeded,
            self.not_found,
            self.failed,
            self.skipped,
            self.persistence_failures
        )
    }
}

/// 查询表单
#[derive(Debug, Clone)]
pub struct QueryForm {
    pub url: String,
    pub identifier_input: Locator,
    pub submit_button: Locator,
    /// 表单元素等待上限，同时作为验证码求解的单次等待上限
    pub wait_timeout: Duration,
    /// 验证码通过后、提交前的等待
    pub submit_settle: Duration,
    pub screenshot_dir: PathBuf,
}

impl QueryForm {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            url: settings.portal.query_url.clone(),
            identifier_input: Locator::css(settings.portal.identifier_input.clone()),
            submit_button: Locator::css(settings.portal.submit_button.clone()),
            wait_timeout: settings.captcha.wait_timeout(),
            submit_settle: settings.scrape.submit_settle(),
            screenshot_dir: settings.scrape.screenshot_dir.clone(),
        }
    }

    pub fn screenshot_path(&self, identifier: &str) -> PathBuf {
        self.screenshot_dir
            .join(format!("error_screenshot_{}.png", identifier))
    }
}

/// 与会话无关的抓取组件，可为每个会话生成一个编排器
#[derive(Clone)]
pub struct ScrapePipeline {
    pub solver: Arc<CaptchaSolver>,
    pub extractor: Arc<EntityExtractor>,
    pub gateway: Arc<PersistenceGateway>,
    pub working_set: Arc<SharedWorkingSet>,
    pub form: QueryForm,
    pub retry: RetryPolicy,
}

impl ScrapePipeline {
    pub fn orchestrator(&self, session: Arc<dyn AutomationSession>) -> ScrapeOrchestrator {
        ScrapeOrchestrator {
            session,
            pipeline: self.clone(),
        }
    }
}

/// 抓取编排器
///
/// 按顺序处理标识号队列：打开查询表单、求解验证码、提取结果并持久化。
/// 单个标识号的任何失败（包括 panic）都只影响它自己。
pub struct ScrapeOrchestrator {
    session: Arc<dyn AutomationSession>,
    pipeline: ScrapePipeline,
}

impl ScrapeOrchestrator {
    pub fn new(session: Arc<dyn AutomationSession>, pipeline: ScrapePipeline) -> Self {
        Self { session, pipeline }
    }

    pub fn working_set(&self) -> &Arc<SharedWorkingSet> {
        &self.pipeline.working_set
    }

    /// 依次处理所有标识号
    ///
    /// # 参数
    ///
    /// * `identifiers` - 原始标识号，无效的会被跳过
    ///
    /// # 返回值
    ///
    /// 本次运行的统计
    pub async fn run<S: AsRef<str>>(&self, identifiers: &[S]) -> RunSummary {
        info!("Starting scrape of {} identifiers", identifiers.len());
        let mut summary = RunSummary::default();
        for raw in identifiers {
            let outcome = self.process(raw.as_ref()).await;
            summary.record(&outcome);
        }
        info!("Run finished: {}", summary);
        summary
    }

    /// 处理单个原始标识号，从不返回错误也不会 panic
    pub async fn process(&self, raw: &str) -> ProcessOutcome {
        let identifier = match EntityIdentifier::parse(raw) {
            Ok(identifier) => identifier,
            Err(e) => {
                warn!("Skipping invalid identifier {:?}: {}", raw, e);
                return ProcessOutcome::Skipped;
            }
        };

        let outcome = match AssertUnwindSafe(self.process_one(&identifier))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(bin = %identifier, "Error processing identifier: {:#}", e);
                self.capture_screenshot(&identifier).await;
                ProcessOutcome::Error(format!("{:#}", e))
            }
            Err(_) => {
                error!(bin = %identifier, "Processing panicked");
                self.capture_screenshot(&identifier).await;
                ProcessOutcome::Error("panic while processing".to_string())
            }
        };

        info!(bin = %identifier, result = %outcome, "Identifier finished");
        outcome
    }

    #[instrument(skip(self, identifier), fields(bin = %identifier))]
    async fn process_one(&self, identifier: &EntityIdentifier) -> Result<ProcessOutcome> {
        info!("--- Processing BIN ---");
        let session = self.session.as_ref();
        let form = &self.pipeline.form;

        let captcha = self.solve_with_retry(identifier).await?;
        if !captcha.is_solved() {
            error!(status = %captcha, "Failed to solve CAPTCHA");
            return Ok(ProcessOutcome::CaptchaFailed(captcha));
        }
        info!("CAPTCHA solved successfully");

        sleep(form.submit_settle).await;
        let submit = session
            .locate(&form.submit_button, form.wait_timeout)
            .await
            .context("search button not available")?;
        session
            .click(&submit)
            .await
            .context("failed to submit query")?;

        match self.pipeline.extractor.extract(session).await {
            ScrapeResult::Found(record) => {
                if &record.identifier != identifier {
                    warn!(page_bin = %record.identifier, "Results page shows a different identifier");
                }
                Ok(self.store(record).await)
            }
            ScrapeResult::NotFound => {
                warn!("Company not found");
                Ok(ProcessOutcome::NotFound)
            }
            ScrapeResult::Failed(reason) => {
                error!("Failed to extract data: {}", reason);
                self.capture_screenshot(identifier).await;
                Ok(ProcessOutcome::ExtractionFailed(reason))
            }
        }
    }

    /// 打开表单并求解验证码；只有配置允许时才会重试
    async fn solve_with_retry(&self, identifier: &EntityIdentifier) -> Result<CaptchaOutcome> {
        let retry = &self.pipeline.retry;
        let mut attempt = 0;
        loop {
            self.open_query_form(identifier).await?;
            let outcome = self
                .pipeline
                .solver
                .solve(self.session.as_ref(), self.pipeline.form.wait_timeout)
                .await;

            if !retry.should_retry_outcome(attempt, &outcome) {
                return Ok(outcome);
            }
            attempt += 1;
            let backoff = retry.backoff_after(attempt, &outcome);
            warn!(
                status = %outcome,
                "CAPTCHA attempt {} of {} failed, retrying in {:?}",
                attempt,
                retry.attempts(),
                backoff
            );
            sleep(backoff).await;
        }
    }

    async fn open_query_form(&self, identifier: &EntityIdentifier) -> Result<()> {
        let session = self.session.as_ref();
        let form = &self.pipeline.form;

        session
            .navigate(&form.url)
            .await
            .context("failed to open query form")?;

        info!("Entering BIN...");
        let input = session
            .locate(&form.identifier_input, form.wait_timeout)
            .await
            .context("identifier input not available")?;
        session.clear(&input).await?;
        session.send_keys(&input, identifier.as_str()).await?;
        Ok(())
    }

    /// 写入工作集，然后刷新两个持久化目标
    async fn store(&self, record: EntityRecord) -> ProcessOutcome {
        let gateway = &self.pipeline.gateway;
        let stored = gateway.upsert(&record).await.is_ok();

        let shared = &self.pipeline.working_set;
        let _flush = shared.flush.lock().await;
        let snapshot = {
            let mut records = shared.records.lock();
            records.upsert(record);
            records.records().to_vec()
        };
        let snapshotted = gateway.snapshot_all(&snapshot).await.is_ok();

        ProcessOutcome::Stored {
            persisted: stored && snapshotted,
        }
    }

    async fn capture_screenshot(&self, identifier: &EntityIdentifier) {
        let path = self.pipeline.form.screenshot_path(identifier.as_str());
        match self.session.capture_diagnostic_image(&path).await {
            Ok(()) => info!("Saved diagnostic screenshot to {}", path.display()),
            Err(e) => warn!("Could not capture diagnostic screenshot: {}", e),
        }
    }
}
