// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use super::models::Company;

/// 爬虫错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlerError {
    /// 网络错误（连接失败、5xx等）
    #[error("Network error: {0}")]
    Network(String),
    /// 响应无法解析
    #[error("Parse error: {0}")]
    Parse(String),
    /// 需要认证或API密钥无效
    #[error("Authentication required: {0}")]
    AuthRequired(String),
    /// 被目标站点封锁（验证码、429、机器人墙）
    #[error("Blocked: {0}")]
    Blocked(String),
}

impl CrawlerError {
    /// 判断错误是否可以按退避策略重试
    ///
    /// 封锁由冷却机制单独处理，不在此列
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlerError::Network(_))
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, CrawlerError::Blocked(_))
    }
}

impl From<reqwest::Error> for CrawlerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CrawlerError::Parse(e.to_string())
        } else {
            CrawlerError::Network(e.to_string())
        }
    }
}

/// 请求画像
///
/// 身份的只读视图，爬虫据此设置 User-Agent、代理和 Cookie
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestProfile {
    identity_id: String,
    user_agent: String,
    proxy: Option<String>,
    headers: Vec<(String, String)>,
    cookies: HashMap<String, String>,
}

impl RequestProfile {
    pub fn new(identity_id: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            identity_id: identity_id.into(),
            user_agent: user_agent.into(),
            ..Default::default()
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_cookies(mut self, cookies: HashMap<String, String>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// 浏览器风格的默认请求头（不含 User-Agent）
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// 拼接为 `Cookie` 请求头的值，没有 Cookie 时返回 None
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let mut pairs: Vec<_> = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        pairs.sort();
        Some(pairs.join("; "))
    }
}

/// 抓取选项
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// 当前身份的请求画像
    pub profile: RequestProfile,
    /// 调用方透传的参数
    pub params: Map<String, Value>,
}

/// 抓取输出
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlOutput {
    /// 原始负载
    pub payload: Value,
    /// 站点返回的会话 Cookie，成功后合并进身份
    pub cookies: HashMap<String, String>,
}

impl From<Value> for CrawlOutput {
    fn from(payload: Value) -> Self {
        Self {
            payload,
            cookies: HashMap::new(),
        }
    }
}

/// 爬虫特质
///
/// 每个数据源一个实现。爬虫不自行限速，节奏由反检测层控制。
#[async_trait]
pub trait Crawler: Send + Sync {
    /// 爬虫名称，写入快照元数据
    fn name(&self) -> &str;

    /// 抓取指定公司的数据
    async fn fetch(
        &self,
        company: &Company,
        options: &FetchOptions,
    ) -> Result<CrawlOutput, CrawlerError>;
}
