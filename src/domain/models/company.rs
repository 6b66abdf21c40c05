// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

static EN_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s+(Limited|Ltd\.?|LLC|Inc\.?|Corporation|Corp\.?|Co\.?|Company|Group|Holdings|HK)$",
    )
    .expect("valid suffix pattern")
});

static ZH_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(香港|有限公司|集团|控股)$").expect("valid suffix pattern"));

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid punctuation pattern"));

/// 标准化公司名称
///
/// 先做 NFKC 兼容折叠（全角字符转半角），再移除末尾的公司类型后缀（英文和中文各一次），
/// 去掉标点，转为小写并去除首尾空白。
pub fn normalize_company_name(name: &str) -> String {
    let folded: String = name.nfkc().collect();
    let name = EN_SUFFIX.replace(folded.trim(), "");
    let name = ZH_SUFFIX.replace(&name, "");
    let name = NON_WORD.replace_all(&name, "");
    name.to_lowercase().trim().to_string()
}

/// 公司标准化键
///
/// 快照存储和任务跟踪都按此键分组
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyKey(String);

impl CompanyKey {
    /// 从已标准化的字符串构造键（例如从存储路径读回）
    pub fn from_normalized(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CompanyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 公司实体
///
/// 一旦被快照引用即不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// 显示名称，原样传给爬虫
    pub display_name: String,
    /// 标准化键
    pub key: CompanyKey,
}

impl Company {
    /// 根据显示名称创建公司，自动计算标准化键
    pub fn new(display_name: impl Into<String>) -> Self {
        let display_name = display_name.into().trim().to_string();
        let key = CompanyKey(normalize_company_name(&display_name));
        Self { display_name, key }
    }

    /// 标准化键为空时公司无效（例如名称只包含标点）
    pub fn is_valid(&self) -> bool {
        !self.key.is_empty()
    }
}

impl fmt::Display for Company {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}
