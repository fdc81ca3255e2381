//! Catalog queries: target resolution order, assignments, prompts, default mappings

use futures::future::join_all;
use uuid::Uuid;

use newsrelay_distribution::{CatalogStore, Exclusion, TargetScope};

use crate::common::TestApp;

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_group_targets_follow_member_order() {
    let app = TestApp::new().await.unwrap();
    let user = Uuid::new_v4();
    let politics = app.create_category("politics").await.unwrap();
    let world = app.create_category("world").await.unwrap();
    let (a, _, _) = app
        .create_target("a", "http://a", world, user)
        .await
        .unwrap();
    let (b, _, _) = app
        .create_target("b", "http://b", politics, user)
        .await
        .unwrap();
    let group = app.create_group(&[world, politics]).await.unwrap();
    app.assign_group(user, group).await.unwrap();

    let catalog = &app.repos.catalog;
    assert_eq!(
        catalog.group_categories(group).await.unwrap(),
        vec![world, politics]
    );
    let through_group = catalog
        .find_assignment(user, &TargetScope::Category(politics))
        .await
        .unwrap();
    assert_eq!(through_group.unwrap().group_id, Some(group));

    let world_targets = catalog.mappings_for_category(world).await.unwrap();
    assert_eq!(world_targets.len(), 1);
    assert_eq!(world_targets[0].destination.id, a.id);
    assert_eq!(world_targets[0].destination_category.external_id, "1");

    let politics_targets = catalog.mappings_for_category(politics).await.unwrap();
    assert_eq!(politics_targets[0].destination.id, b.id);
}

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_prompt_and_identity_lookups() {
    let app = TestApp::new().await.unwrap();
    let user = Uuid::new_v4();
    let category = app.create_category("sport").await.unwrap();
    let (destination, _, _) = app
        .create_target("p", "http://p", category, user)
        .await
        .unwrap();
    app.create_prompt(Some(destination.id), "portal voice")
        .await
        .unwrap();

    let catalog = &app.repos.catalog;
    let prompt = catalog
        .active_prompt(Some(destination.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prompt.prompt_text, "portal voice");

    let identity = catalog
        .destination_user(user, destination.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.destination_user_id, "author-p");
    assert!(catalog
        .destination_user(Uuid::new_v4(), destination.id)
        .await
        .unwrap()
        .is_none());
}

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_set_default_mapping_clears_siblings() {
    let app = TestApp::new().await.unwrap();
    let category = app.create_category("news").await.unwrap();
    let other_category = app.create_category("other").await.unwrap();
    let destination = app.create_destination("d", "http://d").await.unwrap();
    let news = app
        .create_destination_category(&destination, "News", "1")
        .await
        .unwrap();
    let sport = app
        .create_destination_category(&destination, "Sport", "2")
        .await
        .unwrap();
    let first = app.create_mapping(category, &news, false).await.unwrap();
    let second = app
        .create_mapping(other_category, &sport, false)
        .await
        .unwrap();

    let catalog = &app.repos.catalog;
    catalog.set_default_mapping(first.id).await.unwrap();
    let updated = catalog.set_default_mapping(second.id).await.unwrap();
    assert!(updated.is_default);

    let first_now = catalog.mappings_for_category(category).await.unwrap();
    assert!(!first_now[0].mapping.is_default);

    let missing = catalog.set_default_mapping(Uuid::new_v4()).await;
    assert!(missing.is_err());
}

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_concurrent_default_changes_leave_one_default() {
    let app = TestApp::new().await.unwrap();
    let destination = app.create_destination("d", "http://d").await.unwrap();
    let mut mappings = Vec::new();
    for i in 0..6 {
        let category = app.create_category("c").await.unwrap();
        let destination_category = app
            .create_destination_category(&destination, &format!("Section {}", i), &i.to_string())
            .await
            .unwrap();
        mappings.push(
            app.create_mapping(category, &destination_category, false)
                .await
                .unwrap(),
        );
    }

    let results = join_all(
        mappings
            .iter()
            .map(|m| app.repos.catalog.set_default_mapping(m.id)),
    )
    .await;
    assert!(results.iter().all(|r| r.is_ok()));

    let defaults: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM category_mappings m \
         JOIN destination_categories dc ON dc.id = m.destination_category_id \
         WHERE dc.destination_id = $1 AND m.is_default",
    )
    .bind(destination.id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(defaults, 1);
}

#[test_log::test(tokio::test)]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_content_item_round_trips_exclusions() {
    let app = TestApp::new().await.unwrap();
    let user = Uuid::new_v4();
    let excluded = Uuid::new_v4();
    let mut item =
        newsrelay_distribution::ContentItem::new("Title", "Short", "Body", user, None);
    item.excluded_destinations.0 = vec![Exclusion::Id(excluded), Exclusion::from("portal-b")];
    item.counter = Some(7);
    app.create_content_item(&item).await.unwrap();

    let loaded = app
        .repos
        .catalog
        .find_content_item(item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.excluded_destinations.0, item.excluded_destinations.0);
    assert_eq!(loaded.counter, Some(7));
    assert!(loaded.category_id.is_none());
}
