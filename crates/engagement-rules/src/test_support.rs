//! Shared fixtures for unit tests

use crate::model::{ContentType, Event, Platform, Sentiment};
use chrono::DateTime;

/// A neutral Instagram comment posted on Wednesday 2024-05-15 at 10:30 UTC
pub fn comment(text: &str) -> Event {
    Event {
        id: "evt-1".to_string(),
        platform: Platform::Instagram,
        content_type: ContentType::Comment,
        text: text.to_string(),
        author_username: "Sarah_Johnson".to_string(),
        author_follower_count: 500,
        is_following_us: true,
        has_commented_before: false,
        sentiment: Sentiment::Neutral,
        timestamp: at("2024-05-15T10:30:00+00:00"),
    }
}

pub fn at(rfc3339: &str) -> DateTime<chrono::FixedOffset> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap()
}
