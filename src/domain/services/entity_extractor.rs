// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::PortalSettings;
use crate::domain::models::entity_record::{EntityRecord, Metric, YearWindow};
use crate::domain::models::identifier::EntityIdentifier;
use crate::domain::models::scrape_result::ScrapeResult;
use crate::engines::traits::{AutomationSession, Locator};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, error, warn};

/// 财务表行标签
#[derive(Debug, Clone)]
pub struct FinancialLabels {
    pub tax_payment: String,
    pub vat_refund: String,
}

impl FinancialLabels {
    fn metric_for(&self, row_label: &str) -> Option<Metric> {
        if row_label.contains(&self.tax_payment) {
            Some(Metric::TaxPayment)
        } else if row_label.contains(&self.vat_refund) {
            Some(Metric::VatRefund)
        } else {
            None
        }
    }
}

/// 结果页实体提取器
///
/// 等待结果页出现后解析企业信息与各年度财务数据；所有失败都被吸收为 `ScrapeResult`
pub struct EntityExtractor {
    results_container: Locator,
    identity_table: Locator,
    not_found: Locator,
    labels: FinancialLabels,
    window: YearWindow,
    results_timeout: Duration,
    not_found_probe: Duration,
}

impl EntityExtractor {
    pub fn new(portal: &PortalSettings, window: YearWindow) -> Self {
        Self {
            results_container: Locator::css(portal.results_container.clone()),
            identity_table: Locator::css("table.table-bordered"),
            not_found: Locator::containing_text(&portal.not_found_marker),
            labels: FinancialLabels {
                tax_payment: portal.tax_payment_label.clone(),
                vat_refund: portal.vat_refund_label.clone(),
            },
            window,
            results_timeout: portal.results_timeout(),
            not_found_probe: portal.not_found_probe(),
        }
    }

    pub fn window(&self) -> YearWindow {
        self.window
    }

    /// 从当前页面提取实体
    ///
    /// # 参数
    ///
    /// * `session` - 已提交查询的自动化会话
    ///
    /// # 返回值
    ///
    /// * `Found` - 成功解析的记录
    /// * `NotFound` - 页面出现"无结果"提示
    /// * `Failed` - 超时或解析失败
    pub async fn extract(&self, session: &dyn AutomationSession) -> ScrapeResult {
        match session.locate(&self.results_container, self.results_timeout).await {
            Ok(_) => {}
            Err(e) if e.is_timeout() => return self.probe_not_found(session).await,
            Err(e) => {
                error!("Error waiting for results: {}", e);
                return ScrapeResult::failed(e.to_string());
            }
        }

        if let Err(e) = session
            .locate(&self.identity_table, self.results_timeout)
            .await
        {
            error!("Results page has no identity table: {}", e);
            return ScrapeResult::failed(format!("identity table missing: {}", e));
        }

        match session.page_source().await {
            Ok(html) => parse_results_page(&html, self.window, &self.labels),
            Err(e) => {
                error!("Error reading results page: {}", e);
                ScrapeResult::failed(e.to_string())
            }
        }
    }

    async fn probe_not_found(&self, session: &dyn AutomationSession) -> ScrapeResult {
        match session.locate(&self.not_found, self.not_found_probe).await {
            Ok(_) => {
                warn!("Company not found on the portal");
                ScrapeResult::NotFound
            }
            Err(e) => {
                debug!("Not-found marker probe: {}", e);
                error!("Timed out waiting for results, and no 'not found' message was detected");
                ScrapeResult::failed("timed out waiting for results")
            }
        }
    }
}

/// 解析结果页 HTML
///
/// 纯函数：相同输入总是得到相同的记录
///
/// # 参数
///
/// * `html` - 结果页源码
/// * `window` - 财务数据年份范围
/// * `labels` - 财务表行标签
pub fn parse_results_page(html: &str, window: YearWindow, labels: &FinancialLabels) -> ScrapeResult {
    let document = Html::parse_document(html);

    let identity_cells = match first_row_cells(&document, "table.table-bordered tbody tr") {
        Some(cells) => cells,
        None => return ScrapeResult::failed("identity table has no rows"),
    };
    if identity_cells.len() < 6 {
        return ScrapeResult::failed(format!(
            "identity row has {} cells, expected at least 6",
            identity_cells.len()
        ));
    }

    let identifier = match EntityIdentifier::parse(&identity_cells[4]) {
        Ok(identifier) => identifier,
        Err(e) => return ScrapeResult::failed(format!("invalid identifier on page: {}", e)),
    };

    let mut record = EntityRecord::new(identifier, window);
    record.name = identity_cells[1].clone();
    record.legal_form = identity_cells[2].clone();
    record.registration_number = identity_cells[3].clone();
    record.registered_at = parse_date(&identity_cells[5]);

    if let Ok(rows) = Selector::parse("table.table-taxpayment tbody tr") {
        for row in document.select(&rows) {
            let cells = cell_texts(row);
            let Some((label, values)) = cells.split_first() else {
                continue;
            };
            let Some(metric) = labels.metric_for(label) else {
                continue;
            };
            let series = record.series_mut(metric);
            for (year, value) in window.years().zip(values) {
                series.set(year, parse_money_value(value));
            }
        }
    }

    ScrapeResult::Found(record)
}

/// 解析金额文本
///
/// 去除空格（含不间断空格），逗号作小数点；空串或无法解析返回 0.0
pub fn parse_money_value(value: &str) -> f64 {
    let normalized: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if normalized.is_empty() {
        return 0.0;
    }
    match normalized.parse::<f64>() {
        Ok(amount) if amount.is_finite() => amount,
        _ => 0.0,
    }
}

/// 解析 `DD.MM.YYYY` 日期，空串或格式错误返回 `None`
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(value, "%d.%m.%Y").ok()
}

fn first_row_cells(document: &Html, rows: &str) -> Option<Vec<String>> {
    let selector = Selector::parse(rows).ok()?;
    document.select(&selector).next().map(cell_texts)
}

fn cell_texts(row: ElementRef<'_>) -> Vec<String> {
    let Ok(td) = Selector::parse("td") else {
        return Vec::new();
    };
    row.select(&td)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect()
}
