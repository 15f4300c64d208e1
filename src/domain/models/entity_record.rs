// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use crate::domain::models::identifier::EntityIdentifier;

/// 财务数据年份窗口（包含首尾）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearWindow {
    first: i32,
    last: i32,
}

impl YearWindow {
    /// 创建年份窗口，首尾顺序颠倒时自动交换
    pub fn new(first: i32, last: i32) -> Self {
        if first <= last {
            Self { first, last }
        } else {
            Self {
                first: last,
                last: first,
            }
        }
    }

    pub fn first(&self) -> i32 {
        self.first
    }

    pub fn last(&self) -> i32 {
        self.last
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.first..=self.last
    }

    pub fn contains(&self, year: i32) -> bool {
        self.years().contains(&year)
    }
}

impl Default for YearWindow {
    fn default() -> Self {
        Self::new(2020, 2024)
    }
}

/// 财务指标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// 税款缴纳
    TaxPayment,
    /// 增值税超额返还
    VatRefund,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::TaxPayment, Metric::VatRefund];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::TaxPayment => "tax_payment",
            Metric::VatRefund => "vat_refund",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tax_payment" => Some(Metric::TaxPayment),
            "vat_refund" => Some(Metric::VatRefund),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 按年份的金额序列
///
/// 窗口内每一年都有值，缺失的年份为 0.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSeries {
    window: YearWindow,
    amounts: BTreeMap<i32, f64>,
}

impl FinancialSeries {
    /// 创建全零序列
    pub fn zeroed(window: YearWindow) -> Self {
        Self {
            window,
            amounts: window.years().map(|year| (year, 0.0)).collect(),
        }
    }

    pub fn window(&self) -> YearWindow {
        self.window
    }

    /// 获取某年的金额，窗口外或缺失时返回 0.0
    pub fn get(&self, year: i32) -> f64 {
        self.amounts.get(&year).copied().unwrap_or(0.0)
    }

    /// 设置某年的金额，窗口外的年份被忽略
    pub fn set(&mut self, year: i32, amount: f64) {
        if self.window.contains(year) {
            self.amounts.insert(year, amount);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.amounts.iter().map(|(year, amount)| (*year, *amount))
    }
}

/// 企业记录
///
/// 每次成功提取构造一次；同一标识号的后续提取整体替换旧记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// 标识号（主键）
    pub identifier: EntityIdentifier,
    /// 名称
    pub name: String,
    /// 法律形式
    pub legal_form: String,
    /// 登记号
    pub registration_number: String,
    /// 登记日期
    pub registered_at: Option<NaiveDate>,
    /// 税款缴纳
    pub tax_payments: FinancialSeries,
    /// 增值税返还
    pub vat_refunds: FinancialSeries,
}

impl EntityRecord {
    /// 创建财务数据全为零的记录
    pub fn new(identifier: EntityIdentifier, window: YearWindow) -> Self {
        Self {
            identifier,
            name: String::new(),
            legal_form: String::new(),
            registration_number: String::new(),
            registered_at: None,
            tax_payments: FinancialSeries::zeroed(window),
            vat_refunds: FinancialSeries::zeroed(window),
        }
    }

    pub fn series(&self, metric: Metric) -> &FinancialSeries {
        match metric {
            Metric::TaxPayment => &self.tax_payments,
            Metric::VatRefund => &self.vat_refunds,
        }
    }

    pub fn series_mut(&mut self, metric: Metric) -> &mut FinancialSeries {
        match metric {
            Metric::TaxPayment => &mut self.tax_payments,
            Metric::VatRefund => &mut self.vat_refunds,
        }
    }
}
