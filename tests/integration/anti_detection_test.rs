// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use riverinfos::anti_detection::{AntiDetectionConfig, PoolConfig};
use riverinfos::domain::crawler::CrawlerError;
use riverinfos::domain::models::{Company, FailureKind, RateLimitClass, SchemaTag, SourceStatus};
use serde_json::{json, Map};
use std::time::Duration;

use super::helpers::{
    memory_store, orchestrator, quiet_anti_detection, registry, test_orchestrator_config,
    ScriptedCrawler, TestSource,
};

/// 同一域名上并发的抓取从不共用身份
#[tokio::test(start_paused = true)]
async fn concurrent_fetches_never_share_an_identity() {
    let crawler = ScriptedCrawler::with_delay(
        "google",
        vec![Ok(json!({"articles": []}))],
        Duration::from_secs(2),
    );
    let mut source = TestSource::new(
        "news/google",
        crawler.clone(),
        "news.google.com",
        SchemaTag::Articles,
    );
    source.capabilities = source
        .capabilities
        .with_rate_limit(RateLimitClass::Relaxed);

    let config = AntiDetectionConfig {
        pool: PoolConfig {
            pool_size: 2,
            per_domain_concurrency: 2,
            ..PoolConfig::default()
        },
        ..quiet_anti_detection()
    };
    let orch = orchestrator(
        registry(vec![source]),
        memory_store(),
        config,
        test_orchestrator_config(),
    );

    let companies = ["HSBC", "Hang Seng Bank", "Gammon", "Leighton", "Swire", "MTR"];
    let handles: Vec<_> = companies
        .iter()
        .map(|name| {
            orch.submit(
                Company::new(*name),
                vec!["news/google".to_string()],
                Map::new(),
            )
            .unwrap()
        })
        .collect();

    for handle in handles {
        let job = handle.wait().await;
        assert!(job.status_of("news/google").unwrap().is_success());
    }

    assert_eq!(crawler.call_count(), companies.len());
    assert!(!crawler.saw_identity_overlap());
    assert!(crawler.max_active() <= 2);
    assert!(crawler.max_active() >= 2, "fetches should overlap");

    let stats = orch
        .anti_detection()
        .pool_stats("news.google.com")
        .unwrap();
    assert_eq!(stats.in_use, 0);
    assert!(stats.live <= 2);
}

/// 身份生成预算耗尽后数据源变为不可用
#[tokio::test(start_paused = true)]
async fn exhausted_identity_budget_makes_source_unavailable() {
    let crawler = ScriptedCrawler::always(
        "twitter",
        Err(CrawlerError::Blocked("unusual traffic".into())),
    );
    let config = AntiDetectionConfig {
        pool: PoolConfig {
            pool_size: 1,
            generation_budget: 1,
            ..PoolConfig::default()
        },
        ..quiet_anti_detection()
    };
    let orch = orchestrator(
        registry(vec![TestSource::new(
            "social/twitter",
            crawler.clone(),
            "twitter.com",
            SchemaTag::SocialPosts,
        )]),
        memory_store(),
        config,
        test_orchestrator_config(),
    );

    let job = orch
        .run(
            Company::new("HSBC"),
            vec!["social/twitter".to_string()],
            Map::new(),
        )
        .await
        .unwrap();

    assert!(matches!(
        job.status_of("social/twitter"),
        Some(SourceStatus::Unavailable {
            kind: FailureKind::SourceUnavailable,
            ..
        })
    ));
    assert_eq!(crawler.call_count(), 1);
    assert_eq!(
        orch.anti_detection()
            .cooldowns()
            .recent_events("twitter.com")
            .len(),
        1
    );
}
