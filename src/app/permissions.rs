use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::domain::post::Post;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub user_id: String,
    pub display_name: String,
}

/// Who is looking at the wall. Admin rights and the edit window are checked
/// only on this side; the store does not enforce them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub author_id: String,
    pub session: Option<SessionUser>,
    pub is_admin: bool,
}

impl Viewer {
    pub fn anonymous(author_id: String) -> Self {
        Self {
            author_id,
            session: None,
            is_admin: false,
        }
    }

    pub fn owns(&self, post: &Post) -> bool {
        post.author_id == self.author_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PostPermissions {
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_reply: bool,
    pub can_report: bool,
    pub can_clear_preview: bool,
    /// Whole seconds until edit and delete disappear, while they are available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_seconds_left: Option<i64>,
}

pub fn edit_time_left(
    post: &Post,
    viewer: &Viewer,
    now: OffsetDateTime,
    window: Duration,
) -> Option<Duration> {
    if !viewer.owns(post) {
        return None;
    }
    let elapsed = now - post.created_at;
    if elapsed >= window {
        return None;
    }
    Some((window - elapsed).min(window))
}

pub fn permissions(
    post: &Post,
    viewer: &Viewer,
    now: OffsetDateTime,
    window: Duration,
    has_reported: bool,
) -> PostPermissions {
    let left = edit_time_left(post, viewer, now, window);
    let can_edit = left.is_some();
    PostPermissions {
        can_edit,
        can_delete: can_edit || viewer.is_admin,
        can_reply: true,
        can_report: !has_reported,
        can_clear_preview: post.link_preview.is_some() && (can_edit || viewer.is_admin),
        edit_seconds_left: left.map(|left| {
            let secs = left.whole_seconds();
            if left.subsec_nanoseconds() > 0 {
                secs + 1
            } else {
                secs
            }
        }),
    }
}
