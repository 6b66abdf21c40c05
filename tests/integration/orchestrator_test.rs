// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use riverinfos::anti_detection::{AntiDetectionConfig, PoolConfig};
use riverinfos::domain::crawler::CrawlerError;
use riverinfos::domain::models::{
    Company, FailureKind, JobOutcome, RateLimitClass, SchemaTag, SourceStatus,
};
use riverinfos::domain::repositories::snapshot_repository::SnapshotReader;
use riverinfos::orchestrator::OrchestratorError;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::helpers::{
    memory_store, orchestrator, quiet_anti_detection, registry, source_id,
    test_orchestrator_config, FailingStore, PanickingCrawler, ScriptedCrawler, TestSource,
};

fn articles() -> Value {
    json!({"articles": [{"title": "HSBC expands in Asia", "date": "2024-05-01"}]})
}

fn sources(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// 环境合规数据源抓取成功后写入一个快照
#[tokio::test(start_paused = true)]
async fn environmental_compliance_produces_one_snapshot() {
    let payload = json!({
        "company_name": "HSBC",
        "eia_reports": (1..=5)
            .map(|i| json!({"title": format!("EIA report {}", i), "date": format!("2024-0{}-15", i)}))
            .collect::<Vec<_>>(),
        "green_certifications": (1..=5)
            .map(|i| json!({"name": format!("Green cert {}", i), "valid_until": "2026-12-31"}))
            .collect::<Vec<_>>(),
        "violations": []
    });
    let crawler = ScriptedCrawler::always("environmental", Ok(payload));
    let store = memory_store();
    let orch = orchestrator(
        registry(vec![TestSource::new(
            "industry/environmental_compliance",
            crawler.clone(),
            "env.example.gov.hk",
            SchemaTag::EnvironmentalCompliance,
        )]),
        store.clone(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    let job = orch
        .run(
            Company::new("HSBC"),
            sources(&["industry/environmental_compliance"]),
            Map::new(),
        )
        .await
        .unwrap();

    assert_eq!(job.outcome(), JobOutcome::FullySuccessful);
    assert!(matches!(
        job.status_of("industry/environmental_compliance"),
        Some(SourceStatus::Succeeded {
            schema_mismatch: false,
            ..
        })
    ));

    let company = Company::new("HSBC");
    let history = store
        .history(&company.key, &source_id("industry/environmental_compliance"))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    let snapshot = &history[0];
    assert_eq!(snapshot.envelope.source, "environmental_compliance");
    assert_eq!(snapshot.field("eia_reports").unwrap().as_array().unwrap().len(), 5);
    assert_eq!(
        snapshot
            .field("green_certifications")
            .unwrap()
            .as_array()
            .unwrap()
            .len(),
        5
    );
    assert_eq!(snapshot.field("violations"), Some(&json!([])));
    assert_eq!(snapshot.envelope.metadata.crawler, "environmental");
    assert_eq!(snapshot.envelope.metadata.attempts, 1);
}

/// 两次封锁后成功：状态历史为 封锁→封锁→成功，等待时间严格递增
#[tokio::test(start_paused = true)]
async fn blocked_twice_then_succeeds_with_growing_waits() {
    let crawler = ScriptedCrawler::new(
        "twitter",
        vec![
            Err(CrawlerError::Blocked("captcha".into())),
            Err(CrawlerError::Blocked("captcha".into())),
            Ok(json!({"posts": [{"text": "HSBC news", "date": "2024-05-02"}]})),
        ],
    );
    let mut source = TestSource::new(
        "social/twitter",
        crawler.clone(),
        "twitter.com",
        SchemaTag::SocialPosts,
    );
    source.capabilities = source
        .capabilities
        .with_rate_limit(RateLimitClass::Strict);

    let store = memory_store();
    let orch = orchestrator(
        registry(vec![source]),
        store.clone(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    let job = orch
        .run(Company::new("HSBC"), sources(&["social/twitter"]), Map::new())
        .await
        .unwrap();

    let state = &job.sources["social/twitter"];
    let outcomes: Vec<_> = state
        .status_sequence()
        .into_iter()
        .filter(|label| *label != "pending" && *label != "running")
        .collect();
    assert_eq!(outcomes, vec!["blocked", "blocked", "succeeded"]);

    let times = crawler.call_times();
    assert_eq!(times.len(), 3);
    let first_wait = times[1] - times[0];
    let second_wait = times[2] - times[1];
    assert!(first_wait >= Duration::from_secs(30), "{:?}", first_wait);
    assert!(second_wait > first_wait, "{:?} <= {:?}", second_wait, first_wait);

    // Blocked identities are retired, so every attempt uses a fresh one.
    let identities = crawler.identities();
    assert_ne!(identities[0], identities[1]);
    assert_ne!(identities[1], identities[2]);

    let history = store
        .history(&Company::new("HSBC").key, &source_id("social/twitter"))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].envelope.metadata.attempts, 3);
}

/// 一个数据源持续网络错误不影响其他数据源
#[tokio::test(start_paused = true)]
async fn network_failure_is_isolated_to_its_source() {
    let google = ScriptedCrawler::always("google", Ok(articles()));
    let judiciary = ScriptedCrawler::always(
        "judiciary",
        Err(CrawlerError::Network("connection reset".into())),
    );
    let store = memory_store();
    let orch = orchestrator(
        registry(vec![
            TestSource::new("news/google", google.clone(), "news.google.com", SchemaTag::Articles),
            TestSource::new(
                "government/hk_judiciary",
                judiciary.clone(),
                "judiciary.hk",
                SchemaTag::CourtCases,
            ),
        ]),
        store.clone(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    let job = orch
        .run(
            Company::new("HSBC"),
            sources(&["news/google", "government/hk_judiciary"]),
            Map::new(),
        )
        .await
        .unwrap();

    assert_eq!(job.outcome(), JobOutcome::Partial);
    assert!(job.status_of("news/google").unwrap().is_success());
    assert!(matches!(
        job.status_of("government/hk_judiciary"),
        Some(SourceStatus::Failed {
            kind: FailureKind::NetworkError,
            ..
        })
    ));
    // One initial attempt plus max_retries.
    assert_eq!(judiciary.call_count(), 3);

    let key = Company::new("HSBC").key;
    assert_eq!(store.list_sources(&key).await.unwrap(), vec![source_id("news/google")]);
    assert_eq!(
        store
            .history(&key, &source_id("government/hk_judiciary"))
            .await
            .unwrap()
            .len(),
        0
    );
}

/// 未知数据源直接失败，且每个请求的数据源都有终态
#[tokio::test]
async fn unknown_sources_fail_without_affecting_known_ones() {
    let google = ScriptedCrawler::always("google", Ok(articles()));
    let orch = orchestrator(
        registry(vec![TestSource::new(
            "news/google",
            google,
            "news.google.com",
            SchemaTag::Articles,
        )]),
        memory_store(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    let job = orch
        .run(
            Company::new("HSBC"),
            sources(&["news/google", "news/nonexistent", "video/youtube", "news/google"]),
            Map::new(),
        )
        .await
        .unwrap();

    assert_eq!(job.requested.len(), 3);
    assert_eq!(job.terminal_count(), job.requested.len());
    assert!(job.status_of("news/google").unwrap().is_success());
    for unknown in ["news/nonexistent", "video/youtube"] {
        assert!(matches!(
            job.status_of(unknown),
            Some(SourceStatus::Failed {
                kind: FailureKind::UnknownSource,
                ..
            })
        ));
    }
}

#[tokio::test]
async fn submit_rejects_empty_requests() {
    let orch = orchestrator(
        registry(vec![]),
        memory_store(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    assert!(matches!(
        orch.submit(Company::new("HSBC"), vec![], Map::new()),
        Err(OrchestratorError::InvalidRequest(_))
    ));
    assert!(matches!(
        orch.submit(Company::new("  ...  "), sources(&["news/google"]), Map::new()),
        Err(OrchestratorError::InvalidRequest(_))
    ));
}

/// 同一请求提交两次会产生两个不同的快照
#[tokio::test(start_paused = true)]
async fn repeated_submissions_append_new_snapshots() {
    let google = ScriptedCrawler::always("google", Ok(articles()));
    let store = memory_store();
    let orch = orchestrator(
        registry(vec![TestSource::new(
            "news/google",
            google,
            "news.google.com",
            SchemaTag::Articles,
        )]),
        store.clone(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    let first = orch
        .run(Company::new("HSBC Holdings"), sources(&["news/google"]), Map::new())
        .await
        .unwrap();
    let second = orch
        .run(Company::new("HSBC"), sources(&["news/google"]), Map::new())
        .await
        .unwrap();

    let history = store
        .history(&Company::new("HSBC").key, &source_id("news/google"))
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_ne!(history[0].id, history[1].id);
    assert!(history[0].captured_at() < history[1].captured_at());

    let first_id = match first.status_of("news/google") {
        Some(SourceStatus::Succeeded { snapshot_id, .. }) => snapshot_id.clone(),
        other => panic!("unexpected status {:?}", other),
    };
    let second_id = match second.status_of("news/google") {
        Some(SourceStatus::Succeeded { snapshot_id, .. }) => snapshot_id.clone(),
        other => panic!("unexpected status {:?}", other),
    };
    assert_eq!(history[0].id, first_id);
    assert_eq!(history[1].id, second_id);
}

/// 并发提交的同一 (公司, 数据源) 依次抓取，即使域名允许并发
#[tokio::test(start_paused = true)]
async fn concurrent_jobs_for_one_pair_fetch_sequentially() {
    let crawler = ScriptedCrawler::with_delay(
        "google",
        vec![Ok(articles())],
        Duration::from_secs(3),
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

    let store = memory_store();
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
        store.clone(),
        config,
        test_orchestrator_config(),
    );

    let first = orch
        .submit(Company::new("HSBC"), sources(&["news/google"]), Map::new())
        .unwrap();
    let second = orch
        .submit(Company::new("HSBC"), sources(&["news/google"]), Map::new())
        .unwrap();
    let first = first.wait().await;
    let second = second.wait().await;

    assert!(first.status_of("news/google").unwrap().is_success());
    assert!(second.status_of("news/google").unwrap().is_success());
    assert_eq!(crawler.call_count(), 2);
    assert_eq!(crawler.max_active(), 1);

    let times = crawler.call_times();
    assert!(times[1] - times[0] >= Duration::from_secs(3));

    let history = store
        .history(&Company::new("HSBC").key, &source_id("news/google"))
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_ne!(history[0].id, history[1].id);
    assert!(history[0].captured_at() < history[1].captured_at());
}

/// 重新提交只包含失败的数据源
#[tokio::test(start_paused = true)]
async fn resubmit_retries_only_failed_sources() {
    let google = ScriptedCrawler::always("google", Ok(articles()));
    let judiciary = ScriptedCrawler::new(
        "judiciary",
        vec![
            Err(CrawlerError::AuthRequired("401".into())),
            Ok(json!({"cases": []})),
        ],
    );
    let orch = orchestrator(
        registry(vec![
            TestSource::new("news/google", google.clone(), "news.google.com", SchemaTag::Articles),
            TestSource::new(
                "government/hk_judiciary",
                judiciary.clone(),
                "judiciary.hk",
                SchemaTag::CourtCases,
            ),
        ]),
        memory_store(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    let handle = orch
        .submit(
            Company::new("HSBC"),
            sources(&["news/google", "government/hk_judiciary"]),
            Map::new(),
        )
        .unwrap();
    let first = handle.wait().await;
    assert!(matches!(
        first.status_of("government/hk_judiciary"),
        Some(SourceStatus::Failed {
            kind: FailureKind::AuthRequired,
            ..
        })
    ));

    let retry = orch.resubmit(&first.id).unwrap();
    let second = retry.wait().await;
    assert_ne!(second.id, first.id);
    assert_eq!(second.requested, vec!["government/hk_judiciary".to_string()]);
    assert_eq!(second.outcome(), JobOutcome::FullySuccessful);
    assert_eq!(google.call_count(), 1);
    assert_eq!(judiciary.call_count(), 2);

    assert!(matches!(
        orch.resubmit(&second.id),
        Err(OrchestratorError::NothingToResubmit(_))
    ));
}

/// 取消后排队的数据源变为已取消，进行中的抓取照常写入
#[tokio::test(start_paused = true)]
async fn cancel_stops_waiting_sources_but_keeps_in_flight_result() {
    let crawler = ScriptedCrawler::with_delay(
        "slow",
        vec![Ok(articles())],
        Duration::from_secs(5),
    );
    let store = memory_store();
    let orch = orchestrator(
        registry(vec![TestSource::new(
            "news/google",
            crawler.clone(),
            "news.google.com",
            SchemaTag::Articles,
        )]),
        store.clone(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    let in_flight = orch
        .submit(Company::new("HSBC"), sources(&["news/google"]), Map::new())
        .unwrap();
    // Same company and source: waits behind the first job.
    let queued = orch
        .submit(Company::new("HSBC"), sources(&["news/google"]), Map::new())
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(crawler.call_count(), 1);

    orch.cancel(&in_flight.id()).unwrap();
    orch.cancel(&queued.id()).unwrap();

    let in_flight = in_flight.wait().await;
    let queued = queued.wait().await;

    assert!(in_flight.cancelled);
    assert!(in_flight.status_of("news/google").unwrap().is_success());
    assert_eq!(queued.status_of("news/google"), Some(&SourceStatus::Cancelled));
    assert_eq!(crawler.call_count(), 1);

    let history = store
        .history(&Company::new("HSBC").key, &source_id("news/google"))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

/// 快照写入失败只影响该数据源
#[tokio::test(start_paused = true)]
async fn storage_error_fails_only_that_source() {
    let google = ScriptedCrawler::always("google", Ok(articles()));
    let bing = ScriptedCrawler::always("bing", Ok(articles()));
    let inner = memory_store();
    let store = Arc::new(FailingStore::new(inner.clone(), source_id("news/bing")));
    let orch = orchestrator(
        registry(vec![
            TestSource::new("news/google", google, "news.google.com", SchemaTag::Articles),
            TestSource::new("news/bing", bing, "bing.com", SchemaTag::Articles),
        ]),
        store,
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    let job = orch
        .run(
            Company::new("HSBC"),
            sources(&["news/google", "news/bing"]),
            Map::new(),
        )
        .await
        .unwrap();

    assert!(job.status_of("news/google").unwrap().is_success());
    assert!(matches!(
        job.status_of("news/bing"),
        Some(SourceStatus::Failed {
            kind: FailureKind::StorageError,
            ..
        })
    ));
}

/// 爬虫崩溃被转换为失败状态
#[tokio::test(start_paused = true)]
async fn crawler_panic_becomes_failed_status() {
    let google = ScriptedCrawler::always("google", Ok(articles()));
    let orch = orchestrator(
        registry(vec![
            TestSource::new("news/google", google, "news.google.com", SchemaTag::Articles),
            TestSource::new(
                "news/hk",
                Arc::new(PanickingCrawler),
                "news.example.hk",
                SchemaTag::Articles,
            ),
        ]),
        memory_store(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    let job = orch
        .run(
            Company::new("HSBC"),
            sources(&["news/google", "news/hk"]),
            Map::new(),
        )
        .await
        .unwrap();

    assert_eq!(job.terminal_count(), 2);
    assert!(job.status_of("news/google").unwrap().is_success());
    match job.status_of("news/hk") {
        Some(SourceStatus::Failed {
            kind: FailureKind::CrawlerPanic,
            message,
        }) => assert!(message.contains("parser exploded")),
        other => panic!("unexpected status {:?}", other),
    }
}

/// 抓取超时按网络错误的次数重试，最终为 TimedOut
#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out_after_retries() {
    let crawler = ScriptedCrawler::with_delay(
        "sluggish",
        vec![Ok(articles())],
        Duration::from_secs(120),
    );
    let mut config = test_orchestrator_config();
    config.fetch_timeout = Duration::from_secs(5);
    config.retry.max_retries = 1;

    let orch = orchestrator(
        registry(vec![TestSource::new(
            "news/google",
            crawler.clone(),
            "news.google.com",
            SchemaTag::Articles,
        )]),
        memory_store(),
        quiet_anti_detection(),
        config,
    );

    let job = orch
        .run(Company::new("HSBC"), sources(&["news/google"]), Map::new())
        .await
        .unwrap();

    assert_eq!(job.status_of("news/google"), Some(&SourceStatus::TimedOut));
    assert_eq!(crawler.call_count(), 2);
    assert_eq!(job.outcome(), JobOutcome::Failed);
}

/// 负载结构不符时仍然写入快照并标记
#[tokio::test(start_paused = true)]
async fn schema_mismatch_is_stored_with_warnings() {
    let crawler = ScriptedCrawler::always(
        "env",
        Ok(json!({
            "eia_reports": [],
            "green_certifications": [],
            "violations": [{"date": "last tuesday", "penalty": 5000}]
        })),
    );
    let store = memory_store();
    let orch = orchestrator(
        registry(vec![TestSource::new(
            "industry/environmental_compliance",
            crawler,
            "env.example.gov.hk",
            SchemaTag::EnvironmentalCompliance,
        )]),
        store.clone(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );

    let job = orch
        .run(
            Company::new("HSBC"),
            sources(&["industry/environmental_compliance"]),
            Map::new(),
        )
        .await
        .unwrap();

    assert!(matches!(
        job.status_of("industry/environmental_compliance"),
        Some(SourceStatus::Succeeded {
            schema_mismatch: true,
            ..
        })
    ));
    let latest = store
        .latest(
            &Company::new("HSBC").key,
            &source_id("industry/environmental_compliance"),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(latest.schema_mismatch());
    let paths: Vec<_> = latest
        .envelope
        .metadata
        .warnings
        .iter()
        .map(|w| w.path.as_str())
        .collect();
    assert!(paths.contains(&"violations[0].date"));
    assert!(paths.contains(&"violations[0].penalty"));
}

#[tokio::test]
async fn unknown_job_id_is_reported() {
    let orch = orchestrator(
        registry(vec![]),
        memory_store(),
        quiet_anti_detection(),
        test_orchestrator_config(),
    );
    let missing = riverinfos::domain::models::JobId::new();
    assert_eq!(
        orch.get_status(&missing).unwrap_err(),
        OrchestratorError::JobNotFound(missing)
    );
}
