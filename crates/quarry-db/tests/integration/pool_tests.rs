use quarry_core::AppError;
use quarry_core::models::{PostingCandidate, PostingFilter};
use quarry_core::platform::Platform;

use crate::integration::common::{setup_test_db, setup_test_db_with, short_timeout};

#[tokio::test]
async fn held_handle_exhausts_single_connection_pool() {
    let (db, _dir) = setup_test_db_with(short_timeout(1)).await;
    let repo = db.repository();

    let held = db.pool().acquire().await.unwrap();
    let err = repo.health_check().await.unwrap_err();
    assert!(matches!(err, AppError::PoolExhausted { .. }));
    assert!(err.is_retryable());

    drop(held);
    repo.health_check().await.unwrap();
}

#[tokio::test]
async fn operations_return_their_handle() {
    let (db, _dir) = setup_test_db_with(short_timeout(2)).await;
    let repo = db.repository();

    for i in 0..10 {
        let posting = PostingCandidate::new(Platform::Google, "SRE", "Initech").with_source_id(format!("g{i}"));
        repo.upsert_postings(&[posting]).await.unwrap();
        repo.get_postings(&PostingFilter::default()).await.unwrap();
        assert_eq!(db.pool().in_use(), 0);
    }
    // A failed lookup still releases its handle.
    assert!(repo.add_skills(99, &[]).await.is_err());
    assert_eq!(db.pool().in_use(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_share_small_pool() {
    let (db, _dir) = setup_test_db_with(short_timeout(3).with_acquire_timeout(std::time::Duration::from_secs(30))).await;
    let repo = db.repository();

    let mut tasks = Vec::new();
    for writer in 0..8 {
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                let posting = PostingCandidate::new(Platform::Indeed, "Dev", format!("Co {writer}"))
                    .with_source_id(format!("{writer}-{i}"));
                repo.upsert_postings(&[posting]).await?;
            }
            Ok::<_, AppError>(())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(repo.compute_stats().await.unwrap().total_jobs, 80);
    assert!(db.pool().in_use() <= db.pool().size());
}

#[tokio::test]
async fn closed_database_rejects_operations() {
    let (db, _dir) = setup_test_db().await;
    let repo = db.repository();
    repo.health_check().await.unwrap();

    db.close().await;

    assert!(matches!(repo.health_check().await, Err(AppError::PoolClosed)));
    assert!(db.pool().is_closed());
}
