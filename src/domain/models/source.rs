// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// 数据源类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    /// 新闻
    News,
    /// 社交媒体
    Social,
    /// 政府登记
    Government,
    /// 行业记录
    Industry,
}

impl SourceCategory {
    pub const ALL: [SourceCategory; 4] = [
        SourceCategory::News,
        SourceCategory::Social,
        SourceCategory::Government,
        SourceCategory::Industry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::News => "news",
            SourceCategory::Social => "social",
            SourceCategory::Government => "government",
            SourceCategory::Industry => "industry",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceCategory {
    type Err = SourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "news" => Ok(SourceCategory::News),
            "social" => Ok(SourceCategory::Social),
            "government" | "gov" => Ok(SourceCategory::Government),
            "industry" => Ok(SourceCategory::Industry),
            other => Err(SourceIdError::UnknownCategory(other.to_string())),
        }
    }
}

/// 数据源标识解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceIdError {
    #[error("source id must look like `category/name`, got `{0}`")]
    Malformed(String),
    #[error("unknown source category `{0}`")]
    UnknownCategory(String),
}

/// 数据源标识，形如 `industry/environmental_compliance`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId {
    category: SourceCategory,
    name: String,
}

impl SourceId {
    pub fn new(category: SourceCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
        }
    }

    pub fn category(&self) -> SourceCategory {
        self.category
    }

    /// 数据源短名称，也是快照信封中的 `source` 字段
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

impl FromStr for SourceId {
    type Err = SourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (category, name) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| SourceIdError::Malformed(s.to_string()))?;

        let valid_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid_name {
            return Err(SourceIdError::Malformed(s.to_string()));
        }

        Ok(Self {
            category: category.parse()?,
            name: name.to_string(),
        })
    }
}

impl Serialize for SourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 限流等级
///
/// 决定同一域名两次请求之间的最小间隔（抖动另加）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitClass {
    /// 宽松，适合官方API
    Relaxed,
    /// 标准
    #[default]
    Standard,
    /// 严格，适合反爬敏感站点
    Strict,
    /// 自定义最小间隔（毫秒）
    Custom(u64),
}

impl RateLimitClass {
    pub fn min_interval(&self) -> Duration {
        match self {
            RateLimitClass::Relaxed => Duration::from_millis(500),
            RateLimitClass::Standard => Duration::from_millis(1000),
            RateLimitClass::Strict => Duration::from_millis(3000),
            RateLimitClass::Custom(ms) => Duration::from_millis(*ms),
        }
    }
}

impl FromStr for RateLimitClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relaxed" => Ok(RateLimitClass::Relaxed),
            "standard" => Ok(RateLimitClass::Standard),
            "strict" => Ok(RateLimitClass::Strict),
            other => other
                .strip_suffix("ms")
                .and_then(|ms| ms.parse().ok())
                .map(RateLimitClass::Custom)
                .ok_or_else(|| format!("unknown rate limit class `{}`", other)),
        }
    }
}

/// 顶层字段的 JSON 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    List,
    Object,
}

/// 负载模式标签
///
/// 规范化器据此做结构校验
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemaTag {
    /// 新闻文章列表
    Articles,
    /// 社交媒体帖子
    SocialPosts,
    /// 公司注册查询结果
    CompanyRegistry,
    /// 司法案件
    CourtCases,
    /// 公司信息加申报文件
    CompanyFilings,
    /// 公司信息加项目
    CompanyProjects,
    /// 招标公告
    Tenders,
    /// 建筑资质
    Qualifications,
    /// 环境合规记录
    EnvironmentalCompliance,
    /// 财务分析
    FinancialAnalysis,
    /// 市场声誉
    MarketReputation,
    /// 不做结构校验
    #[default]
    Opaque,
}

impl SchemaTag {
    /// 必需的顶层字段
    pub fn required_fields(&self) -> &'static [(&'static str, FieldKind)] {
        use FieldKind::*;
        match self {
            SchemaTag::Articles => &[("articles", List)],
            SchemaTag::SocialPosts => &[("posts", List)],
            SchemaTag::CompanyRegistry => &[("results", List)],
            SchemaTag::CourtCases => &[("cases", List)],
            SchemaTag::CompanyFilings => &[("company_info", Object), ("filings", List)],
            SchemaTag::CompanyProjects => &[("company_info", Object), ("projects", List)],
            SchemaTag::Tenders => &[("tenders", List)],
            SchemaTag::Qualifications => &[("qualifications", List)],
            SchemaTag::EnvironmentalCompliance => &[
                ("eia_reports", List),
                ("green_certifications", List),
                ("violations", List),
            ],
            SchemaTag::FinancialAnalysis => &[
                ("stock_info", Object),
                ("financial_ratios", Object),
                ("historical_financials", Object),
            ],
            SchemaTag::MarketReputation => &[
                ("awards", List),
                ("ratings", List),
                ("memberships", List),
            ],
            SchemaTag::Opaque => &[],
        }
    }
}

impl FromStr for SchemaTag {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
    }
}

/// 数据源能力元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCapabilities {
    /// 显示名称
    pub display_name: String,
    /// 描述
    pub description: String,
    /// 目标域名，限速和身份池都按域名划分
    pub domain: String,
    /// 限流等级
    pub rate_limit: RateLimitClass,
    /// 被封锁时是否需要轮换身份
    pub rotate_identity: bool,
    /// 期望的负载模式
    pub schema: SchemaTag,
    /// 是否启用
    pub enabled: bool,
}

impl SourceCapabilities {
    pub fn new(domain: impl Into<String>, schema: SchemaTag) -> Self {
        let domain = domain.into();
        Self {
            display_name: domain.clone(),
            description: String::new(),
            domain,
            rate_limit: RateLimitClass::default(),
            rotate_identity: true,
            schema,
            enabled: true,
        }
    }

    pub fn with_display(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.display_name = name.into();
        self.description = description.into();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitClass) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_rotation(mut self, rotate_identity: bool) -> Self {
        self.rotate_identity = rotate_identity;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
