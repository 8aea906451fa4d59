//! Display model handed to the front end. Every string that came from a user
//! or a fetched page is HTML-escaped here; nothing downstream escapes again.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::app::permissions::{permissions, PostPermissions, SessionUser, Viewer};
use crate::app::preview::url_spans;
use crate::domain::post::{LinkPreview, Post, SortOrder};
use crate::domain::vote::VoteKind;
use crate::infra::prefs::LocalPrefs;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Avatar {
    pub initial: String,
    pub hue: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPreview {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPost {
    pub id: String,
    pub author_name: String,
    pub avatar: Avatar,
    pub message_html: String,
    pub created_at: String,
    pub relative_time: String,
    pub edited: bool,
    pub likes: i64,
    pub dislikes: i64,
    pub active_vote: Option<VoteKind>,
    pub vote_pending: bool,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub link_preview: Option<RenderedPreview>,
    pub is_reply: bool,
    /// Root-level display of a reply whose parent is gone.
    pub orphaned: bool,
    pub permissions: PostPermissions,
    pub replies: Vec<RenderedPost>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPage {
    pub posts: Vec<RenderedPost>,
    pub sort: SortOrder,
    pub page: usize,
    pub total_pages: usize,
    pub total_roots: usize,
    pub empty: bool,
    pub connected: bool,
    pub reply_target: Option<String>,
    pub author_id: String,
    pub remembered_name: Option<String>,
    pub session: Option<SessionUser>,
    pub is_admin: bool,
}

pub struct RenderContext<'a> {
    pub viewer: &'a Viewer,
    pub prefs: &'a LocalPrefs,
    pub voting: &'a HashSet<String>,
    pub now: OffsetDateTime,
    pub edit_window: Duration,
}

impl RenderContext<'_> {
    pub fn render_post(&self, post: &Post, replies: Vec<RenderedPost>, orphaned: bool) -> RenderedPost {
        RenderedPost {
            id: post.id.clone(),
            author_name: escape(&post.author_name),
            avatar: avatar(&post.author_name),
            message_html: message_html(&post.message),
            created_at: post.created_at.format(&Rfc3339).unwrap_or_default(),
            relative_time: relative_time(post.created_at, self.now),
            edited: post.edited_at.is_some(),
            likes: post.likes,
            dislikes: post.dislikes,
            active_vote: self.prefs.votes.get(&post.id).copied(),
            vote_pending: self.voting.contains(&post.id),
            location: post.location.as_deref().map(escape),
            image_url: post.image_url.as_deref().and_then(safe_image_src),
            link_preview: post.link_preview.as_ref().map(render_preview),
            is_reply: post.is_reply(),
            orphaned,
            permissions: permissions(
                post,
                self.viewer,
                self.now,
                self.edit_window,
                self.prefs.reported.contains(&post.id),
            ),
            replies,
        }
    }
}

fn escape(value: &str) -> String {
    html_escape::encode_text(value).into_owned()
}

fn escape_attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).into_owned()
}

/// Escapes the message, keeps line breaks and turns URLs into links.
pub fn message_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut cursor = 0;
    for span in url_spans(text) {
        push_text(&mut out, &text[cursor..span.start]);
        let url = &text[span.clone()];
        out.push_str(&format!(
            "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a>",
            escape_attr(url),
            escape(url)
        ));
        cursor = span.end;
    }
    push_text(&mut out, &text[cursor..]);
    out
}

fn push_text(out: &mut String, text: &str) {
    let normalized = text.replace("\r\n", "\n");
    let mut lines = normalized.split('\n');
    if let Some(first) = lines.next() {
        out.push_str(&escape(first));
    }
    for line in lines {
        out.push_str("<br>");
        out.push_str(&escape(line));
    }
}

/// Only inline images and http(s) sources make it to an `src` attribute.
fn safe_image_src(src: &str) -> Option<String> {
    let lower = src.trim_start().to_ascii_lowercase();
    if lower.starts_with("data:image/") || lower.starts_with("https://") || lower.starts_with("http://") {
        Some(escape_attr(src))
    } else {
        None
    }
}

fn render_preview(preview: &LinkPreview) -> RenderedPreview {
    RenderedPreview {
        url: escape_attr(&preview.url),
        title: escape(&preview.title),
        description: preview.description.as_deref().map(escape),
        image: preview.image.as_deref().and_then(safe_image_src),
    }
}

pub fn avatar(name: &str) -> Avatar {
    let initial = name
        .trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect::<String>())
        .unwrap_or_else(|| "?".to_string());
    let digest = Sha256::digest(name.trim().to_lowercase().as_bytes());
    let hue = u16::from_be_bytes([digest[0], digest[1]]) % 360;
    Avatar {
        initial: escape(&initial),
        hue,
    }
}

pub fn relative_time(created_at: OffsetDateTime, now: OffsetDateTime) -> String {
    let elapsed = now - created_at;
    if elapsed < Duration::minutes(1) {
        "just now".to_string()
    } else if elapsed < Duration::hours(1) {
        format!("{} min ago", elapsed.whole_minutes())
    } else if elapsed < Duration::days(1) {
        format!("{} h ago", elapsed.whole_hours())
    } else {
        format!("{} d ago", elapsed.whole_days())
    }
}
