// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 标识符校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier {0:?} contains non-digit characters")]
    NonDigit(String),
}

/// 企业标识号（BIN）
///
/// 只包含数字的不透明字符串键，构造时完成校验，之后不可变
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityIdentifier(String);

impl EntityIdentifier {
    /// 解析并校验标识号
    ///
    /// 去除首尾空白和 UTF-8 BOM 后必须非空且全部为 ASCII 数字
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let value = raw.trim().trim_start_matches('\u{feff}').trim();
        if value.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdentifierError::NonDigit(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityIdentifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EntityIdentifier> for String {
    fn from(value: EntityIdentifier) -> Self {
        value.0
    }
}
