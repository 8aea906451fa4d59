use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A message on the wall. `parent_id` set means the post is a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub message: String,
    pub author_name: String,
    pub author_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Store-assigned document order, breaks `created_at` ties.
    pub seq: i64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub likes: i64,
    pub dislikes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_preview: Option<LinkPreview>,
}

impl Post {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Everything the client supplies when creating a post. Id, timestamps and
/// counters are assigned by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostDraft {
    pub message: String,
    pub author_name: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub link_preview: Option<LinkPreview>,
}

/// Partial update. Counter fields are deltas applied atomically by the store,
/// never absolute values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPatch {
    pub message: Option<String>,
    /// `Some(None)` clears the preview, `None` leaves it untouched.
    pub link_preview: Option<Option<LinkPreview>>,
    pub likes_delta: i64,
    pub dislikes_delta: i64,
}

impl PostPatch {
    pub fn edit(message: String, link_preview: Option<LinkPreview>) -> Self {
        Self {
            message: Some(message),
            link_preview: Some(link_preview),
            ..Self::default()
        }
    }

    pub fn clear_preview() -> Self {
        Self {
            link_preview: Some(None),
            ..Self::default()
        }
    }

    pub fn counters(likes_delta: i64, dislikes_delta: i64) -> Self {
        Self {
            likes_delta,
            dislikes_delta,
            ..Self::default()
        }
    }
}

/// Incremental change notification from the live feed.
#[derive(Debug, Clone, PartialEq)]
pub enum PostChange {
    Added(Post),
    Modified(Post),
    Removed(String),
}

impl PostChange {
    pub fn post_id(&self) -> &str {
        match self {
            Self::Added(post) | Self::Modified(post) => &post.id,
            Self::Removed(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Recent,
    Popular,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}
