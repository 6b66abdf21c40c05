// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::crawler::CrawlerError;

/// 机器人墙标记（出现在 403/503 页面中）
static BOT_WALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(cloudflare|attention required|access denied|checking your browser|ddos protection|bot detection|request blocked|are you a robot)",
    )
    .expect("valid bot wall pattern")
});

/// 验证码或异常流量提示（任意状态码）
static CHALLENGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(captcha|recaptcha|hcaptcha|unusual traffic|verify you are human|our systems have detected)",
    )
    .expect("valid challenge pattern")
});

/// 只检查响应体的前若干字节
const SCAN_LIMIT: usize = 16 * 1024;

/// 响应分类器
///
/// 把 HTTP 状态码和响应体映射为爬虫错误
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockDetector;

impl BlockDetector {
    pub fn new() -> Self {
        Self
    }

    /// 返回 None 表示响应可以继续解析
    pub fn classify(&self, status: u16, body: &str) -> Option<CrawlerError> {
        let head = truncate(body, SCAN_LIMIT);

        if status == 429 {
            return Some(CrawlerError::Blocked("HTTP 429 Too Many Requests".to_string()));
        }
        if (status == 403 || status == 503) && BOT_WALL.is_match(head) {
            return Some(CrawlerError::Blocked(format!("HTTP {} bot wall", status)));
        }
        // JSON bodies are data; a headline mentioning a captcha is not a challenge page.
        let looks_like_json = matches!(head.trim_start().chars().next(), Some('{' | '['));
        if let Some(m) = CHALLENGE.find(head).filter(|_| !looks_like_json) {
            return Some(CrawlerError::Blocked(format!(
                "challenge page detected ({})",
                m.as_str().to_lowercase()
            )));
        }
        if status == 401 {
            return Some(CrawlerError::AuthRequired("HTTP 401 Unauthorized".to_string()));
        }
        if !(200..300).contains(&status) {
            return Some(CrawlerError::Network(format!("HTTP {}", status)));
        }
        None
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
