// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::CompanyInfoSettings;
use crate::domain::models::entity_record::YearWindow;
use crate::domain::models::identifier::EntityIdentifier;
use crate::utils::input_loader::{self, InputError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const OUTPUT_SUFFIX: &str = "_extracted.csv";

/// 企业信息补充错误
#[derive(Error, Debug)]
pub enum CompanyInfoError {
    #[error("Company info request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Company info request returned {0}")]
    Status(u16),
    #[error("Could not read identifiers: {0}")]
    Input(#[from] InputError),
    #[error("Could not write output: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 公开企业信息接口返回的一条记录
///
/// 字段缺失或为 `null` 时为空字符串，税款按年份保存接口给出的原始数值文本
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyInfo {
    pub bin: String,
    pub location: String,
    pub tax_payments: BTreeMap<i32, String>,
    pub degree_of_risk: String,
    pub executive: String,
    pub phone: String,
    pub email: String,
}

impl CompanyInfo {
    /// 请求失败时写出的占位行，只有 BIN
    pub fn placeholder(bin: &str) -> Self {
        Self {
            bin: bin.to_string(),
            ..Self::default()
        }
    }

    /// 从接口 JSON 中提取字段
    pub fn from_json(bin: &str, data: &Value) -> Self {
        let location = [
            &["basicInfo", "legalAddress"][..],
            &["basicInfo", "factAddress"][..],
            &["basicInfo", "address"][..],
            &["address"][..],
        ]
        .iter()
        .map(|path| text_at(data, path))
        .find(|text| !text.is_empty())
        .unwrap_or_default();

        let tax_payments = data
            .pointer("/taxes/taxGraph")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let year = entry.get("year")?.as_i64()?;
                        Some((i32::try_from(year).ok()?, scalar_text(entry.get("value")?)))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut phone = text_at(data, &["contacts", "phone"]);
        if phone.is_empty() {
            phone = data
                .pointer("/contacts/phones")
                .and_then(Value::as_array)
                .map(|phones| {
                    phones
                        .iter()
                        .map(scalar_text)
                        .filter(|p| !p.is_empty())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
        }

        Self {
            bin: bin.to_string(),
            location,
            tax_payments,
            degree_of_risk: text_at(data, &["degreeOfRisk", "value"]),
            executive: text_at(data, &["ceo", "value", "title"]),
            phone,
            email: text_at(data, &["contacts", "email"]),
        }
    }

    fn row(&self, window: YearWindow) -> Vec<String> {
        let mut row = vec![self.bin.clone(), self.location.clone()];
        for year in window.years() {
            row.push(self.tax_payments.get(&year).cloned().unwrap_or_default());
        }
        row.extend([
            self.degree_of_risk.clone(),
            self.executive.clone(),
            self.phone.clone(),
            self.email.clone(),
        ]);
        row
    }
}

fn text_at(data: &Value, path: &[&str]) -> String {
    path.iter()
        .try_fold(data, |current, key| current.get(key))
        .map(scalar_text)
        .unwrap_or_default()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) if s != "null" => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// 单个输入文件的补充结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub fetched: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl fmt::Display for EnrichSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fetched, {} failed, {} skipped",
            self.fetched, self.failed, self.skipped
        )
    }
}

/// 企业信息补充客户端
///
/// 对地区 CSV 中的每个 BIN 请求 `CompanyFullInfo?id=<bin>`，写出 `<name>_extracted.csv`
pub struct CompanyInfoClient {
    client: reqwest::Client,
    endpoint: String,
    language: String,
    request_delay: Duration,
    window: YearWindow,
}

impl CompanyInfoClient {
    pub fn new(settings: &CompanyInfoSettings) -> Result<Self, CompanyInfoError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("taxrs/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            language: settings.language.clone(),
            request_delay: settings.request_delay(),
            window: settings.year_window(),
        })
    }

    /// 输出表头：BIN、地址、按年份的税款、风险等级、负责人、电话、邮箱
    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["BIN".to_string(), "location".to_string()];
        for year in self.window.years() {
            header.push(format!("tax_payment_{}", year));
        }
        header.extend(
            ["degreeofrisk", "executive", "phone", "email"]
                .iter()
                .map(|c| c.to_string()),
        );
        header
    }

    /// 请求单个 BIN 的企业信息
    pub async fn fetch(&self, bin: &EntityIdentifier) -> Result<CompanyInfo, CompanyInfoError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("id", bin.as_str()), ("lang", self.language.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompanyInfoError::Status(status.as_u16()));
        }

        let data: Value = response.json().await?;
        Ok(CompanyInfo::from_json(bin.as_str(), &data))
    }

    /// 补充一个输入文件
    ///
    /// 请求失败的 BIN 写出占位行，非数字的行跳过；相邻请求之间等待 `request_delay`
    ///
    /// # 参数
    ///
    /// * `input` - 地区 CSV，第一列为 BIN
    /// * `output` - 输出 CSV 路径
    pub async fn enrich_file(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<EnrichSummary, CompanyInfoError> {
        let mut summary = EnrichSummary::default();
        let identifiers: Vec<EntityIdentifier> = input_loader::load_identifiers(input)?
            .iter()
            .filter_map(|raw| match EntityIdentifier::parse(raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    summary.skipped += 1;
                    None
                }
            })
            .collect();

        info!(
            "Enriching {} identifiers from {:?} into {:?}",
            identifiers.len(),
            input,
            output
        );

        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(self.header())?;

        for (idx, bin) in identifiers.iter().enumerate() {
            if idx > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            let info = match self.fetch(bin).await {
                Ok(info) => {
                    debug!("Fetched company info for {}", bin);
                    summary.fetched += 1;
                    info
                }
                Err(e) => {
                    warn!("Failed to fetch company info for {}: {}", bin, e);
                    summary.failed += 1;
                    CompanyInfo::placeholder(bin.as_str())
                }
            };
            writer.write_record(info.row(self.window))?;
        }

        let content = writer
            .into_inner()
            .map_err(|e| CompanyInfoError::Io(e.into_error()))?;
        tokio::fs::write(output, content).await?;

        info!("Enrichment of {:?} finished: {}", input, summary);
        Ok(summary)
    }

    /// 补充一个文件或目录下的全部 `.csv` 文件
    ///
    /// # 返回值
    ///
    /// 每个输入文件对应的输出路径与结果
    pub async fn enrich_path(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<Vec<(PathBuf, EnrichSummary)>, CompanyInfoError> {
        let inputs = if input.is_dir() {
            let mut files = Vec::new();
            let mut entries = tokio::fs::read_dir(input).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let is_csv = path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false);
                if is_csv && path.is_file() {
                    files.push(path);
                }
            }
            files.sort();
            files
        } else {
            vec![input.to_path_buf()]
        };

        if inputs.is_empty() {
            warn!("No CSV files found in {:?}", input);
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(output_dir).await?;

        let mut results = Vec::with_capacity(inputs.len());
        for path in inputs {
            let output = output_dir.join(output_name(&path));
            let summary = self.enrich_file(&path, &output).await?;
            results.push((output, summary));
        }
        Ok(results)
    }
}

/// `region.csv` → `region_extracted.csv`
pub fn output_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}{}", stem, OUTPUT_SUFFIX)
}
