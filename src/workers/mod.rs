// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供抓取编排和多工作者管理功能
/// 包括单标识号处理流程、工作集维护和并发工作者调度
pub mod manager;
pub mod orchestrator;

pub use manager::WorkerManager;
pub use orchestrator::{RunSummary, ScrapeOrchestrator};
