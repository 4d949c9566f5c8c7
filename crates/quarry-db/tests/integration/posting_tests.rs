use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use quarry_core::models::{JobSkill, PostingCandidate, PostingFilter};
use quarry_core::orchestrator::{FetchOrchestrator, PersistOutcome, SearchRequest};
use quarry_core::platform::Platform;
use quarry_core::source::SourceRegistry;
use quarry_core::testutil::MockSource;

use crate::integration::common::setup_test_repo;

fn candidate(id: &str) -> PostingCandidate {
    PostingCandidate::new(Platform::Indeed, "Rust Engineer", "Acme")
        .with_source_id(id)
        .with_url(format!("https://indeed.example/jobs/{id}"))
        .with_location("Berlin")
}

#[tokio::test]
async fn reupsert_updates_in_place() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let first = candidate("abc").with_description("Original");

    let summary = repo.upsert_postings(&[first.clone()]).await.unwrap();
    assert_eq!(summary.inserted, 1);
    let before = repo
        .get_postings(&PostingFilter::by_fingerprint(first.fingerprint()))
        .await
        .unwrap();
    assert_eq!(before.len(), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let summary = repo
        .upsert_postings(&[first.clone().with_description("Revised")])
        .await
        .unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.updated, 1);

    let after = repo
        .get_postings(&PostingFilter::by_fingerprint(first.fingerprint()))
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
    let stored = &after[0];
    assert_eq!(stored.id, before[0].id);
    assert_eq!(stored.description.as_deref(), Some("Revised"));
    assert_eq!(stored.first_seen_at, before[0].first_seen_at);
    assert!(stored.last_seen_at > before[0].last_seen_at);
    assert_eq!(stored.times_seen, 2);
}

#[tokio::test]
async fn salary_is_replaced_on_resighting() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let posting = candidate("salary");

    repo.upsert_postings(&[posting.clone().with_salary(Some(50_000.0), None, Some("USD"))])
        .await
        .unwrap();
    repo.upsert_postings(&[posting.clone().with_salary(Some(55_000.0), None, None)])
        .await
        .unwrap();

    let stored = repo
        .get_postings(&PostingFilter::by_fingerprint(posting.fingerprint()))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].salary_min, Some(55_000.0));
    assert_eq!(stored[0].currency.as_deref(), Some("USD"));
}

#[tokio::test]
async fn url_collision_is_skipped_not_fatal() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let original = candidate("one");
    let clash = PostingCandidate::new(Platform::Indeed, "Other", "Other Co")
        .with_source_id("two")
        .with_url("https://indeed.example/jobs/one");
    let fine = candidate("three");

    let summary = repo
        .upsert_postings(&[original, clash, fine])
        .await
        .unwrap();

    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(repo.get_postings(&PostingFilter::default()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn filters_and_ordering() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let date = |d| NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
    repo.upsert_postings(&[
        candidate("old").with_posted_date(date(1)),
        candidate("new").with_posted_date(date(20)),
        PostingCandidate::new(Platform::LinkedIn, "Data Engineer", "Globex")
            .with_source_id("urn:1")
            .with_location("Remote, US")
            .with_posted_date(date(10)),
        PostingCandidate::new(Platform::Google, "Undated", "Initech").with_source_id("g"),
    ])
    .await
    .unwrap();

    let all = repo.get_postings(&PostingFilter::default()).await.unwrap();
    let ids: Vec<_> = all.iter().map(|p| p.source_id.clone().unwrap()).collect();
    assert_eq!(ids, vec!["new", "urn:1", "old", "g"]);

    let acme = repo
        .get_postings(&PostingFilter {
            company: Some("acm".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(acme.len(), 2);

    let remote = repo
        .get_postings(&PostingFilter {
            location: Some("remote".into()),
            platform: Some(Platform::LinkedIn),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].platform, Platform::LinkedIn);

    let recent = repo
        .get_postings(&PostingFilter {
            posted_since: Some(date(5)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(recent.len(), 2);

    let page = repo
        .get_postings(&PostingFilter {
            limit: 1,
            offset: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page[0].source_id.as_deref(), Some("urn:1"));

    let by_id = repo.get_posting(page[0].id).await.unwrap().unwrap();
    assert_eq!(by_id.company, "Globex");
    assert!(repo.get_posting(9_999).await.unwrap().is_none());
}

#[tokio::test]
async fn text_filters_match_wildcards_literally() {
    let (repo, _db, _dir) = setup_test_repo().await;
    repo.upsert_postings(&[
        PostingCandidate::new(Platform::Indeed, "Engineer", "100% Remote").with_source_id("pct"),
        PostingCandidate::new(Platform::Indeed, "Engineer", "1000 Remote").with_source_id("digits"),
        PostingCandidate::new(Platform::Indeed, "Engineer", "Acme")
            .with_source_id("site")
            .with_location("site_a"),
        PostingCandidate::new(Platform::Indeed, "Engineer", "Acme")
            .with_source_id("other")
            .with_location("siteXa"),
    ])
    .await
    .unwrap();

    let by_company = |company: &str| PostingFilter {
        company: Some(company.into()),
        ..Default::default()
    };
    let percent = repo.get_postings(&by_company("100%")).await.unwrap();
    assert_eq!(percent.len(), 1);
    assert_eq!(percent[0].company, "100% Remote");
    assert_eq!(repo.get_postings(&by_company("%")).await.unwrap().len(), 1);

    let underscore = repo
        .get_postings(&PostingFilter {
            location: Some("site_".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(underscore.len(), 1);
    assert_eq!(underscore[0].source_id.as_deref(), Some("site"));
}

#[tokio::test]
async fn concurrent_batches_store_each_fingerprint_once() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let batch: Vec<_> = (0..20).map(|i| candidate(&format!("job-{i}"))).collect();
    let batch = Arc::new(batch);

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let repo = repo.clone();
        let batch = batch.clone();
        tasks.push(tokio::spawn(async move { repo.upsert_postings(&batch).await }));
    }
    let mut inserted = 0;
    let mut updated = 0;
    for task in tasks {
        let summary = task.await.unwrap().unwrap();
        inserted += summary.inserted;
        updated += summary.updated;
    }

    assert_eq!(inserted, 20);
    assert_eq!(updated, 60);
    let stats = repo.compute_stats().await.unwrap();
    assert_eq!(stats.total_jobs, 20);
}

#[tokio::test]
async fn skills_attach_once_per_job() {
    let (repo, _db, _dir) = setup_test_repo().await;
    repo.upsert_postings(&[candidate("s")]).await.unwrap();
    let job = &repo.get_postings(&PostingFilter::default()).await.unwrap()[0];

    let skills = vec![
        JobSkill {
            skill: "Rust".into(),
            importance: Some("required".into()),
        },
        JobSkill {
            skill: "rust ".into(),
            importance: None,
        },
        JobSkill {
            skill: "SQL".into(),
            importance: None,
        },
    ];
    assert_eq!(repo.add_skills(job.id, &skills).await.unwrap(), 2);

    let stored = repo.skills_for_job(job.id).await.unwrap();
    let names: Vec<_> = stored.iter().map(|s| s.skill.as_str()).collect();
    assert_eq!(names, vec!["rust", "sql"]);

    assert!(repo.add_skills(424_242, &skills).await.is_err());
}

#[tokio::test]
async fn orchestrator_persists_through_repository() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let registry = SourceRegistry::new()
        .register(Arc::new(
            MockSource::new(Platform::Indeed).with_postings(vec![candidate("a"), candidate("b")]),
        ))
        .register(Arc::new(MockSource::new(Platform::Glassdoor).with_postings(vec![
            PostingCandidate::new(Platform::Glassdoor, "Rust Engineer", "Acme").with_location("Berlin"),
        ])));
    let orchestrator = FetchOrchestrator::new(registry, repo.clone());

    let result = orchestrator
        .search(&SearchRequest::new("rust").with_platforms([Platform::Indeed, Platform::Glassdoor]))
        .await;

    // Glassdoor's posting matches Indeed's on company/title/location.
    assert_eq!(result.duplicates_dropped, 1);
    match result.persisted {
        PersistOutcome::Stored(summary) => assert_eq!(summary.inserted, 2),
        other => panic!("unexpected persist outcome: {other:?}"),
    }
    assert_eq!(repo.compute_stats().await.unwrap().jobs_by_platform["indeed"], 2);
}
