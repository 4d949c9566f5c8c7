use std::time::Duration;

use quarry_core::AppError;
use quarry_core::models::{
    ApplicationStatus, ApplicationUpdate, NewApplication, NewResume, PostingCandidate, PostingFilter,
};
use quarry_core::platform::Platform;
use quarry_db::Repository;

use crate::integration::common::setup_test_repo;

async fn seed_job(repo: &Repository, id: &str) -> i64 {
    let posting = PostingCandidate::new(Platform::ZipRecruiter, format!("Engineer {id}"), "Acme")
        .with_source_id(id)
        .with_location("Austin, TX");
    repo.upsert_postings(&[posting.clone()]).await.unwrap();
    repo.get_postings(&PostingFilter::by_fingerprint(posting.fingerprint()))
        .await
        .unwrap()[0]
        .id
}

fn resume(name: &str) -> NewResume {
    NewResume {
        filename: name.into(),
        file_path: format!("uploads/{name}"),
        file_type: "pdf".into(),
        content: None,
    }
}

#[tokio::test]
async fn create_requires_existing_job() {
    let (repo, _db, _dir) = setup_test_repo().await;

    let err = repo
        .create_application(&NewApplication::new(777))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(msg) if msg.contains("777")));

    let job_id = seed_job(&repo, "1").await;
    let app = repo
        .create_application(&NewApplication::new(job_id).with_notes("referral").with_match_score(82.5))
        .await
        .unwrap();
    assert_eq!(app.job_id, job_id);
    assert_eq!(app.status, ApplicationStatus::Pending);
    assert_eq!(app.match_score, Some(82.5));
    assert_eq!(app.applied_at, app.updated_at);
}

#[tokio::test]
async fn create_rejects_missing_resume_and_bad_score() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let job_id = seed_job(&repo, "1").await;

    let err = repo
        .create_application(&NewApplication::new(job_id).with_resume(55))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = repo
        .create_application(&NewApplication::new(job_id).with_match_score(140.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn every_update_touches_updated_at() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let job_id = seed_job(&repo, "1").await;
    let created = repo
        .create_application(&NewApplication::new(job_id))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let applied = repo
        .update_application(created.id, &ApplicationUpdate::status(ApplicationStatus::Applied))
        .await
        .unwrap();
    assert_eq!(applied.status, ApplicationStatus::Applied);
    assert!(applied.updated_at > created.updated_at);
    assert_eq!(applied.applied_at, created.applied_at);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let noted = repo
        .update_application(
            created.id,
            &ApplicationUpdate {
                notes: Some("phone screen booked".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(noted.status, ApplicationStatus::Applied);
    assert_eq!(noted.notes.as_deref(), Some("phone screen booked"));
    assert!(noted.updated_at > applied.updated_at);
}

#[tokio::test]
async fn update_errors() {
    let (repo, _db, _dir) = setup_test_repo().await;

    let err = repo
        .update_application(1, &ApplicationUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(msg) if msg == "No fields to update"));

    let err = repo
        .update_application(404, &ApplicationUpdate::status(ApplicationStatus::Rejected))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn list_joins_postings_and_filters_by_status() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let first = seed_job(&repo, "1").await;
    let second = seed_job(&repo, "2").await;
    repo.create_application(&NewApplication::new(first)).await.unwrap();
    let other = repo
        .create_application(&NewApplication::new(second))
        .await
        .unwrap();
    repo.update_application(other.id, &ApplicationUpdate::status(ApplicationStatus::Interviewing))
        .await
        .unwrap();

    let all = repo.list_applications(None, 10).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|a| a.company == "Acme"));

    let interviewing = repo
        .list_applications(Some(ApplicationStatus::Interviewing), 10)
        .await
        .unwrap();
    assert_eq!(interviewing.len(), 1);
    assert_eq!(interviewing[0].job_title, "Engineer 2");
    assert_eq!(interviewing[0].location.as_deref(), Some("Austin, TX"));

    let stats = repo.compute_stats().await.unwrap();
    assert_eq!(stats.total_applications, 2);
    assert_eq!(stats.applications_by_status["pending"], 1);
    assert_eq!(stats.applications_by_status["interviewing"], 1);
}

#[tokio::test]
async fn deleting_resume_keeps_application() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let job_id = seed_job(&repo, "1").await;
    let cv = repo.create_resume(&resume("cv.pdf")).await.unwrap();
    let app = repo
        .create_application(&NewApplication::new(job_id).with_resume(cv.id))
        .await
        .unwrap();
    assert_eq!(app.resume_id, Some(cv.id));
    assert_eq!(repo.list_resumes().await.unwrap().len(), 1);

    repo.delete_resume(cv.id).await.unwrap();

    let kept = repo.get_application(app.id).await.unwrap().unwrap();
    assert_eq!(kept.resume_id, None);
    assert!(repo.list_resumes().await.unwrap().is_empty());
    assert!(matches!(repo.delete_resume(cv.id).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn delete_application() {
    let (repo, _db, _dir) = setup_test_repo().await;
    let job_id = seed_job(&repo, "1").await;
    let app = repo
        .create_application(&NewApplication::new(job_id))
        .await
        .unwrap();

    repo.delete_application(app.id).await.unwrap();

    assert!(repo.get_application(app.id).await.unwrap().is_none());
    assert!(matches!(repo.delete_application(app.id).await, Err(AppError::NotFound(_))));
    // The posting itself is never removed.
    assert!(repo.get_posting(job_id).await.unwrap().is_some());
}
