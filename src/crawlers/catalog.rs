// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use config::ConfigError;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::http_crawler::{HttpCrawler, HttpCrawlerConfig};
use super::registry::{SourceRegistry, SourceRegistryBuilder};
use crate::config::settings::SourceSettings;
use crate::domain::crawler::{CrawlOutput, Crawler, CrawlerError, FetchOptions};
use crate::domain::models::{
    Company, RateLimitClass, SchemaTag, SourceCapabilities, SourceCategory, SourceId,
};
use crate::utils::url_utils::extract_domain;

/// 默认数据源目录
///
/// 每项给出标识与能力元数据；具体爬虫端点由配置提供
pub fn default_catalog() -> Vec<(SourceId, SourceCapabilities)> {
    use RateLimitClass::*;
    use SchemaTag::*;
    use SourceCategory::*;

    let entry = |category: SourceCategory,
                 name: &str,
                 domain: &str,
                 schema: SchemaTag,
                 rate: RateLimitClass,
                 display: &str,
                 description: &str| {
        (
            SourceId::new(category, name),
            SourceCapabilities::new(domain, schema)
                .with_rate_limit(rate)
                .with_display(display, description),
        )
    };

    vec![
        entry(News, "google", "google.com", Articles, Strict,
            "Google News", "Google News search results"),
        entry(News, "bing", "bing.com", Articles, Standard,
            "Bing News", "Bing News search results"),
        entry(News, "hk", "scmp.com", Articles, Standard,
            "Hong Kong Local News", "Hong Kong local news websites"),
        entry(News, "construction", "constructionnews.co.uk", Articles, Standard,
            "Construction Industry News", "Construction industry news websites"),
        entry(Social, "twitter", "nitter.net", SocialPosts, Strict,
            "Twitter Public Information", "Public posts on Twitter"),
        entry(Social, "linkedin", "linkedin.com", SocialPosts, Strict,
            "LinkedIn Public Information", "Public company information on LinkedIn"),
        entry(Social, "facebook", "facebook.com", SocialPosts, Strict,
            "Facebook Public Information", "Public company pages on Facebook"),
        entry(Government, "hk_companies_registry", "icris.cr.gov.hk", CompanyRegistry, Standard,
            "Hong Kong Companies Registry", "Company information from the Hong Kong Companies Registry"),
        entry(Government, "hk_judiciary", "legalref.judiciary.hk", CourtCases, Standard,
            "Hong Kong Judiciary Records", "Public records from the Hong Kong judiciary"),
        entry(Government, "sec_edgar", "sec.gov", CompanyFilings, Relaxed,
            "SEC EDGAR", "US SEC company filings"),
        entry(Government, "china_company", "qcc.com", CompanyProjects, Strict,
            "China Company Information", "Mainland China company and project records"),
        entry(Government, "intl_tenders", "tendersinfo.com", Tenders, Standard,
            "International Tenders", "International tender announcements"),
        entry(Industry, "construction_qualifications", "cic.hk", Qualifications, Standard,
            "Construction Qualifications", "Construction industry qualification information"),
        entry(Industry, "environmental_compliance", "epd.gov.hk", EnvironmentalCompliance, Standard,
            "Environmental Compliance", "EIA reports, green certifications and violations"),
        entry(Industry, "financial_analysis", "hkex.com.hk", FinancialAnalysis, Relaxed,
            "Financial Analysis", "Stock information and financial ratios"),
        entry(Industry, "market_reputation", "hkca.com.hk", MarketReputation, Standard,
            "Market Reputation", "Awards, ratings and association memberships"),
    ]
}

/// 占位爬虫
///
/// 没有配置端点的数据源使用它，返回带 `error` 字段的负载
pub struct PlaceholderCrawler {
    name: String,
}

impl PlaceholderCrawler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Crawler for PlaceholderCrawler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        company: &Company,
        _options: &FetchOptions,
    ) -> Result<CrawlOutput, CrawlerError> {
        Ok(json!({
            "error": format!("Crawler {} not implemented yet", self.name),
            "company_name": company.display_name,
        })
        .into())
    }
}

type SourcesSettings = BTreeMap<String, BTreeMap<String, SourceSettings>>;

/// 根据默认目录和配置构建注册表
///
/// 配置中出现而默认目录没有的数据源必须给出端点
pub fn build_registry(sources: &SourcesSettings) -> Result<Arc<SourceRegistry>, ConfigError> {
    let mut remaining = sources.clone();
    let mut builder = SourceRegistry::builder();

    for (id, caps) in default_catalog() {
        let settings = remaining
            .get_mut(id.category().as_str())
            .and_then(|names| names.remove(id.name()))
            .unwrap_or_default();
        register(&mut builder, id, caps, settings)?;
    }

    for (category, names) in remaining {
        let category: SourceCategory = category
            .parse()
            .map_err(|e| ConfigError::Message(format!("sources.{}: {}", category, e)))?;
        for (name, settings) in names {
            let id: SourceId = format!("{}/{}", category, name)
                .parse()
                .map_err(|e| ConfigError::Message(format!("sources.{}.{}: {}", category, name, e)))?;
            let endpoint = settings.endpoint.as_deref().ok_or_else(|| {
                ConfigError::Message(format!("source {} is not in the catalog and has no endpoint", id))
            })?;
            let domain = extract_domain(endpoint).unwrap_or_default();
            let caps = SourceCapabilities::new(domain, SchemaTag::Opaque)
                .with_display(name.clone(), String::new());
            register(&mut builder, id, caps, settings)?;
        }
    }

    let registry = builder.build();
    let enabled = SourceCategory::ALL
        .iter()
        .flat_map(|c| registry.list(*c))
        .filter(|id| registry.resolve(id).is_ok_and(|s| s.is_enabled()))
        .count();
    info!("{} of {} sources enabled", enabled, registry.len());
    Ok(registry)
}

fn register(
    builder: &mut SourceRegistryBuilder,
    id: SourceId,
    mut caps: SourceCapabilities,
    settings: SourceSettings,
) -> Result<(), ConfigError> {
    let invalid = |field: &str, detail: String| {
        ConfigError::Message(format!("sources.{}.{}: {}", id, field, detail))
    };

    if let Some(rate) = &settings.rate_limit {
        caps.rate_limit = rate.parse::<RateLimitClass>().map_err(|e| invalid("rate_limit", e))?;
    }
    if let Some(rotate) = settings.rotate_identity {
        caps.rotate_identity = rotate;
    }
    if let Some(schema) = &settings.schema {
        caps.schema = schema
            .parse()
            .map_err(|e: serde_json::Error| invalid("schema", e.to_string()))?;
    }
    if let Some(name) = &settings.display_name {
        caps.display_name = name.clone();
    }
    if let Some(description) = &settings.description {
        caps.description = description.clone();
    }

    let crawler: Arc<dyn Crawler> = match &settings.endpoint {
        Some(endpoint) => {
            let domain = extract_domain(endpoint)
                .ok_or_else(|| invalid("endpoint", format!("`{}` is not a valid URL", endpoint)))?;
            caps.domain = domain;
            caps.enabled = settings.enabled.unwrap_or(true);

            let mut config = HttpCrawlerConfig::new(id.to_string(), endpoint.clone());
            if let Some(param) = &settings.query_param {
                config.query_param = param.clone();
            }
            if let Some(header) = &settings.api_key_header {
                config.api_key_header = header.clone();
            }
            config.api_key = settings.api_key.clone();
            Arc::new(HttpCrawler::new(config))
        }
        None => {
            caps.enabled = settings.enabled.unwrap_or(false);
            if caps.enabled {
                warn!("Source {} enabled without an endpoint, using placeholder", id);
            }
            Arc::new(PlaceholderCrawler::new(id.to_string()))
        }
    };
    if let Some(domain) = &settings.domain {
        caps.domain = domain.clone();
    }
    if caps.domain.is_empty() {
        return Err(invalid("domain", "could not determine source domain".to_string()));
    }

    builder
        .register(id.clone(), crawler, caps)
        .map_err(|e| ConfigError::Message(e.to_string()))?;
    Ok(())
}
