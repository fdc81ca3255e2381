//! End-to-end publish: Postgres ledger, mock rewrite provider, wiremock portals

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsrelay_distribution::{
    ContentItem, DistributionPublisher, DistributionStatus, DistributionStore, Exclusion,
    PublishError, PublishRequest, PublisherSettings, TargetOutcome,
};
use newsrelay_llm::mock::MockLlmService;
use newsrelay_portal::client::PortalClient;

use crate::common::TestApp;

fn publisher(app: &TestApp) -> DistributionPublisher {
    DistributionPublisher::new(
        Arc::new(app.repos.catalog.clone()),
        Arc::new(app.repos.records.clone()),
        Arc::new(MockLlmService::new()),
        Arc::new(PortalClient::new(Duration::from_secs(5)).unwrap()),
        PublisherSettings::default(),
    )
}

async fn portal(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/create-news/"))
        .and(body_string_contains("post_title"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_publish_records_each_destination() {
    let app = TestApp::new().await.unwrap();
    let user = Uuid::new_v4();
    let category = app.create_category("politics").await.unwrap();
    let ok = portal(201, "created").await;
    let broken = portal(500, "db error").await;
    let (a, _, _) = app
        .create_target("a", &ok.uri(), category, user)
        .await
        .unwrap();
    let (b, _, _) = app
        .create_target("b", &broken.uri(), category, user)
        .await
        .unwrap();
    app.assign_category(user, category).await.unwrap();
    let item = ContentItem::new("Budget passes", "Short", "<p>Body</p>", user, Some(category));
    app.create_content_item(&item).await.unwrap();

    let report = publisher(&app)
        .publish(PublishRequest::new(item.id, user), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].outcome, TargetOutcome::SentSuccess);
    assert_eq!(report.results[1].outcome, TargetOutcome::SentFailed);
    assert_eq!(report.results[1].message, "db error");

    let records = app.repos.records.list_by_content(item.id).await.unwrap();
    let record_a = records.iter().find(|r| r.destination_id == a.id).unwrap();
    let record_b = records.iter().find(|r| r.destination_id == b.id).unwrap();
    assert_eq!(record_a.status, DistributionStatus::Success);
    assert_eq!(record_a.ai_slug.as_deref(), Some("budget-passes"));
    assert!(record_a.time_taken_ms.is_some());
    assert_eq!(record_b.status, DistributionStatus::Failed);
    assert_eq!(record_b.response_message, "db error");

    let again = publisher(&app)
        .publish(PublishRequest::new(item.id, user), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.results[0].outcome, TargetOutcome::SkippedAlreadySuccess);
    assert_eq!(again.results[1].outcome, TargetOutcome::SentFailed);

    let record_b = app.repos.records.find(record_b.id).await.unwrap().unwrap();
    assert_eq!(record_b.retry_count, 1);
    assert_eq!(ok.received_requests().await.unwrap().len(), 1);
    assert_eq!(broken.received_requests().await.unwrap().len(), 2);
}

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_excluded_and_unassigned() {
    let app = TestApp::new().await.unwrap();
    let user = Uuid::new_v4();
    let category = app.create_category("world").await.unwrap();
    let server = portal(201, "created").await;
    let (destination, _, _) = app
        .create_target("x", &server.uri(), category, user)
        .await
        .unwrap();
    let item = ContentItem::new("Title", "Short", "Body", user, Some(category));
    app.create_content_item(&item).await.unwrap();

    let err = publisher(&app)
        .publish(PublishRequest::new(item.id, user), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Resolution(_)));

    app.assign_category(user, category).await.unwrap();
    let request = PublishRequest::new(item.id, user)
        .with_exclusions(vec![Exclusion::Name(destination.name.clone())]);
    let report = publisher(&app)
        .publish(request, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.results[0].outcome, TargetOutcome::SkippedExcluded);
    assert!(app
        .repos
        .records
        .list_by_content(item.id)
        .await
        .unwrap()
        .is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}
