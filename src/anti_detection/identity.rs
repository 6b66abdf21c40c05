// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use crate::domain::crawler::RequestProfile;

/// 默认 User-Agent 列表
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// 浏览器风格的默认请求头
pub fn browser_headers() -> Vec<(String, String)> {
    [
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9,zh-HK;q=0.8,zh;q=0.7"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Cache-Control", "max-age=0"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// 爬取身份
///
/// 由反检测层持有，爬虫只能看到 [`RequestProfile`]
#[derive(Debug, Clone)]
pub struct Identity {
    id: String,
    user_agent: String,
    proxy: Option<String>,
    cookies: HashMap<String, String>,
    requests_used: u32,
}

impl Identity {
    pub fn new(user_agent: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_agent: user_agent.into(),
            proxy,
            cookies: HashMap::new(),
            requests_used: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn requests_used(&self) -> u32 {
        self.requests_used
    }

    pub(crate) fn record_request(&mut self) {
        self.requests_used = self.requests_used.saturating_add(1);
    }

    /// 合并站点返回的会话 Cookie
    pub(crate) fn merge_cookies(&mut self, cookies: &HashMap<String, String>) {
        for (k, v) in cookies {
            self.cookies.insert(k.clone(), v.clone());
        }
    }

    /// 生成只读的请求画像
    pub fn profile(&self) -> RequestProfile {
        RequestProfile::new(self.id.clone(), self.user_agent.clone())
            .with_proxy(self.proxy.clone())
            .with_headers(browser_headers())
            .with_cookies(self.cookies.clone())
    }
}

/// 身份生成策略
///
/// 随机选择 User-Agent，代理按轮询分配
#[derive(Debug)]
pub struct IdentityGenerator {
    user_agents: Vec<String>,
    proxies: Vec<String>,
    next_proxy: AtomicUsize,
}

impl IdentityGenerator {
    pub fn new(user_agents: Vec<String>, proxies: Vec<String>) -> Self {
        let user_agents = if user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            user_agents
        };
        Self {
            user_agents,
            proxies,
            next_proxy: AtomicUsize::new(0),
        }
    }

    pub fn generate(&self) -> Identity {
        let user_agent = self.user_agents[rand::random_range(0..self.user_agents.len())].clone();
        let proxy = if self.proxies.is_empty() {
            None
        } else {
            let i = self.next_proxy.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
            Some(self.proxies[i].clone())
        };
        Identity::new(user_agent, proxy)
    }
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}
