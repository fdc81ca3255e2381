//! Mapping from a content item and its rewrite to the destination payload

use chrono::{DateTime, Utc};
use newsrelay_portal::PublishPayload;

use crate::domain::entities::{ContentItem, DestinationCategory, RewrittenContent};

/// Build the ingestion payload for one destination.
///
/// Missing event dates default to `now`'s date, a missing schedule to `now`,
/// a missing counter to 0.
pub fn build_payload(
    item: &ContentItem,
    content: &RewrittenContent,
    destination_category: &DestinationCategory,
    author: &str,
    now: DateTime<Utc>,
) -> PublishPayload {
    let today = now.date_naive();

    PublishPayload {
        post_cat: destination_category.external_id.clone(),
        post_title: content.title.clone(),
        post_short_des: content.short_description.clone(),
        post_des: content.description.clone(),
        meta_title: content.meta_title.clone(),
        slug: content.slug.clone(),
        post_tag: item.post_tag.clone().unwrap_or_default(),
        author: author.to_string(),
        event_date: item.event_date.unwrap_or(today),
        event_end_date: item.event_end_date.unwrap_or(today),
        schedule_date: item.schedule_date.unwrap_or(now),
        is_active: item.latest_news,
        event: item.upcoming_event,
        head_lines: item.head_lines,
        articles: item.articles,
        trending: item.trending,
        breaking_news: item.breaking_news,
        post_status: item.counter.unwrap_or(0),
    }
}
