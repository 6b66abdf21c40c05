// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{COOKIE, USER_AGENT};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::anti_detection::BlockDetector;
use crate::domain::crawler::{CrawlOutput, Crawler, CrawlerError, FetchOptions};
use crate::domain::models::Company;

/// HTTP爬虫配置
#[derive(Debug, Clone)]
pub struct HttpCrawlerConfig {
    /// 爬虫名称
    pub name: String,
    /// 查询端点
    pub endpoint: String,
    /// 公司名称所在的查询参数
    pub query_param: String,
    /// API密钥
    pub api_key: Option<String>,
    /// API密钥请求头
    pub api_key_header: String,
    /// 客户端超时
    pub timeout: Duration,
}

impl HttpCrawlerConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            query_param: "q".to_string(),
            api_key: None,
            api_key_header: "X-API-Key".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// 通用HTTP爬虫
///
/// 以 `GET endpoint?q=<公司名>&<参数>` 查询一个返回 JSON 的端点。
/// 不包含任何站点专用的选择器。
pub struct HttpCrawler {
    config: HttpCrawlerConfig,
    detector: BlockDetector,
    /// 每个代理一个客户端（None 表示直连）
    clients: DashMap<Option<String>, reqwest::Client>,
}

impl HttpCrawler {
    pub fn new(config: HttpCrawlerConfig) -> Self {
        Self {
            config,
            detector: BlockDetector::new(),
            clients: DashMap::new(),
        }
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<reqwest::Client, CrawlerError> {
        let key = proxy.map(str::to_string);
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .gzip(true)
            .brotli(true);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| CrawlerError::Network(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| CrawlerError::Network(format!("failed to build client: {}", e)))?;

        self.clients.insert(key, client.clone());
        Ok(client)
    }

    fn query_pairs(&self, company: &Company, options: &FetchOptions) -> Vec<(String, String)> {
        let mut pairs = vec![(
            self.config.query_param.clone(),
            company.display_name.clone(),
        )];
        for (k, v) in &options.params {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            pairs.push((k.clone(), value));
        }
        pairs
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch(
        &self,
        company: &Company,
        options: &FetchOptions,
    ) -> Result<CrawlOutput, CrawlerError> {
        let profile = &options.profile;
        let client = self.client_for(profile.proxy())?;

        let mut request = client
            .get(&self.config.endpoint)
            .query(&self.query_pairs(company, options));
        if !profile.user_agent().is_empty() {
            request = request.header(USER_AGENT, profile.user_agent());
        }
        for (name, value) in profile.headers() {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = profile.cookie_header() {
            request = request.header(COOKIE, cookie);
        }
        if let Some(key) = &self.config.api_key {
            request = request.header(self.config.api_key_header.as_str(), key.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let cookies: HashMap<String, String> = response
            .cookies()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        let body = response.text().await?;
        debug!(
            "{} answered {} for {} ({} bytes)",
            self.config.name,
            status,
            company,
            body.len()
        );

        if let Some(err) = self.detector.classify(status, &body) {
            return Err(err);
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| CrawlerError::Parse(format!("response is not JSON: {}", e)))?;
        Ok(CrawlOutput { payload, cookies })
    }
}
