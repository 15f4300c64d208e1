// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{SessionError, SessionFactory};
use crate::workers::orchestrator::{RunSummary, ScrapePipeline};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

/// 工作管理器
///
/// 启动多个工作者，每个工作者拥有独立的自动化会话，从共享队列中取标识号
pub struct WorkerManager {
    factory: Arc<dyn SessionFactory>,
    pipeline: ScrapePipeline,
}

impl WorkerManager {
    pub fn new(factory: Arc<dyn SessionFactory>, pipeline: ScrapePipeline) -> Self {
        Self { factory, pipeline }
    }

    /// 启动工作进程并等待队列处理完毕
    ///
    /// # 参数
    ///
    /// * `identifiers` - 原始标识号队列
    /// * `count` - 要启动的工作进程数量
    ///
    /// # 返回值
    ///
    /// * `Ok(RunSummary)` - 所有工作者统计之和
    /// * `Err(SessionError)` - 一个会话都无法创建
    pub async fn run(&self, identifiers: Vec<String>, count: usize) -> Result<RunSummary, SessionError> {
        let queue = Arc::new(Mutex::new(VecDeque::from(identifiers)));
        let mut handles: Vec<JoinHandle<RunSummary>> = Vec::new();
        let mut last_error = None;

        for worker_id in 0..count.max(1) {
            let session = match self.factory.create_session().await {
                Ok(session) => session,
                Err(e) => {
                    error!("Worker {} could not open a session: {}", worker_id, e);
                    last_error = Some(e);
                    continue;
                }
            };

            let orchestrator = self.pipeline.orchestrator(session.clone());
            let queue = queue.clone();
            let span = info_span!("worker", worker_id);
            let handle = tokio::spawn(
                async move {
                    info!("Worker started");
                    let mut summary = RunSummary::default();
                    loop {
                        let next = queue.lock().await.pop_front();
                        let Some(raw) = next else {
                            break;
                        };
                        let outcome = orchestrator.process(&raw).await;
                        summary.record(&outcome);
                    }
                    if let Err(e) = session.close().await {
                        warn!("Failed to close session: {}", e);
                    }
                    info!("Worker finished: {}", summary);
                    summary
                }
                .instrument(span),
            );
            handles.push(handle);
        }

        if handles.is_empty() {
            return Err(last_error.unwrap_or_else(|| SessionError::driver("no workers started")));
        }

        let mut total = RunSummary::default();
        for handle in handles {
            match handle.await {
                Ok(summary) => total.merge(&summary),
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        info!("Run finished: {}", total);
        Ok(total)
    }
}
