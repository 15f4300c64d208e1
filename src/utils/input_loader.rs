// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::path::Path;
use thiserror::Error;
use tracing::info;

/// 输入文件错误
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Could not read input file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse input file: {0}")]
    Csv(#[from] csv::Error),
}

/// 读取标识号列表
///
/// 支持 CSV（取第一列）或每行一个值的纯文本；首行以 `bin` 开头时视为表头跳过。
/// 不做格式校验，非数字的值原样返回，由编排器统计为跳过。
pub fn load_identifiers<P: AsRef<Path>>(path: P) -> Result<Vec<String>, InputError> {
    let content = std::fs::read(path.as_ref())?;
    let identifiers = parse_identifiers(&content)?;
    info!(
        "Loaded {} identifiers from {:?}",
        identifiers.len(),
        path.as_ref()
    );
    Ok(identifiers)
}

pub fn parse_identifiers(content: &[u8]) -> Result<Vec<String>, InputError> {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let mut identifiers = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let Some(first) = record.get(0).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        if idx == 0 && first.to_lowercase().starts_with("bin") {
            continue;
        }
        identifiers.push(first.to_string());
    }
    Ok(identifiers)
}
