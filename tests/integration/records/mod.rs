//! Distribution ledger: atomic get-or-create, retry accounting, SUCCESS guard

use chrono::{Duration, Utc};
use futures::future::join_all;
use uuid::Uuid;

use newsrelay_common::Error;
use newsrelay_distribution::{
    ContentItem, DistributionStatus, DistributionStore, NewDistribution, RewrittenContent,
};

use crate::common::TestApp;

async fn new_distribution(app: &TestApp) -> NewDistribution {
    let user = Uuid::new_v4();
    let category = app.create_category("politics").await.unwrap();
    let (destination, news, _) = app
        .create_target("portal", "http://localhost", category, user)
        .await
        .unwrap();
    let item = ContentItem::new("Title", "Short", "<p>Body</p>", user, Some(category));
    app.create_content_item(&item).await.unwrap();

    NewDistribution {
        content_id: item.id,
        destination_id: destination.id,
        destination_category_id: news.id,
        category_id: category,
    }
}

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_concurrent_get_or_create_yields_one_record() {
    let app = TestApp::new().await.unwrap();
    let new = new_distribution(&app).await;

    let attempts = join_all((0..8).map(|_| app.repos.records.get_or_create(&new))).await;

    let results: Vec<_> = attempts.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
    let id = results[0].0.id;
    assert!(results.iter().all(|(record, _)| record.id == id));

    let listed = app.repos.records.list_by_content(new.content_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, DistributionStatus::Pending);
    assert_eq!(listed[0].response_message, "Queued for publishing");
}

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_retry_then_success_is_final() {
    let app = TestApp::new().await.unwrap();
    let new = new_distribution(&app).await;
    let (record, _) = app.repos.records.get_or_create(&new).await.unwrap();

    assert!(app.repos.records.begin_retry(record.id).await.unwrap().is_none());

    let mut failed = record.clone();
    failed.fail("connection refused", Utc::now()).unwrap();
    app.repos.records.update_status(&failed).await.unwrap();

    let retried = app
        .repos
        .records
        .begin_retry(record.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retried.status, DistributionStatus::Pending);
    assert_eq!(retried.retry_count, 1);
    assert_eq!(retried.response_message, "Retrying...");

    let content = RewrittenContent {
        title: "T".to_string(),
        short_description: "S".to_string(),
        description: "D".to_string(),
        meta_title: "M".to_string(),
        slug: "m".to_string(),
    };
    let mut delivered = retried.clone();
    delivered
        .complete(true, "created", &content, 1200, Utc::now())
        .unwrap();
    let stored = app.repos.records.update_status(&delivered).await.unwrap();
    assert_eq!(stored.status, DistributionStatus::Success);
    assert_eq!(stored.ai_slug.as_deref(), Some("m"));
    assert_eq!(stored.time_taken_ms, Some(1200));
    assert_eq!(stored.retry_count, 1);

    let mut late = retried;
    late.fail("late failure", Utc::now()).unwrap();
    let err = app.repos.records.update_status(&late).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert!(app.repos.records.begin_retry(record.id).await.unwrap().is_none());

    let found = app.repos.records.find(record.id).await.unwrap().unwrap();
    assert_eq!(found.status, DistributionStatus::Success);
    assert_eq!(found.response_message, "created");
}

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_pending_record_is_claimed_once_its_lease_lapses() {
    let app = TestApp::new().await.unwrap();
    let new = new_distribution(&app).await;
    let (record, created) = app.repos.records.get_or_create(&new).await.unwrap();
    assert!(created);
    assert!(record.attempt_started_at.is_some());

    let fresh = app
        .repos
        .records
        .claim_pending(record.id, Duration::minutes(15))
        .await
        .unwrap();
    assert!(fresh.is_none());

    sqlx::query(
        "UPDATE distribution_records SET attempt_started_at = NOW() - INTERVAL '1 hour' \
         WHERE id = $1",
    )
    .bind(record.id)
    .execute(&app.pool)
    .await
    .unwrap();

    let claims = join_all(
        (0..4).map(|_| app.repos.records.claim_pending(record.id, Duration::minutes(15))),
    )
    .await;
    let won: Vec<_> = claims
        .into_iter()
        .filter_map(|claim| claim.unwrap())
        .collect();
    assert_eq!(won.len(), 1);
    assert_eq!(won[0].status, DistributionStatus::Pending);
    assert!(won[0].attempt_started_at.unwrap() > Utc::now() - Duration::minutes(1));

    let mut failed = won[0].clone();
    failed.fail("connection refused", Utc::now()).unwrap();
    let stored = app.repos.records.update_status(&failed).await.unwrap();
    assert!(stored.attempt_started_at.is_none());
    assert!(app
        .repos
        .records
        .claim_pending(record.id, Duration::zero())
        .await
        .unwrap()
        .is_none());
}

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_records_outlive_attempts_to_delete_their_parents() {
    let app = TestApp::new().await.unwrap();
    let new = new_distribution(&app).await;
    let (record, _) = app.repos.records.get_or_create(&new).await.unwrap();

    let drop_destination = sqlx::query("DELETE FROM destinations WHERE id = $1")
        .bind(new.destination_id)
        .execute(&app.pool)
        .await;
    assert!(drop_destination.is_err());

    let drop_item = sqlx::query("DELETE FROM content_items WHERE id = $1")
        .bind(new.content_id)
        .execute(&app.pool)
        .await;
    assert!(drop_item.is_err());

    assert!(app.repos.records.find(record.id).await.unwrap().is_some());
}
