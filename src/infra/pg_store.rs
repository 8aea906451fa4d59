use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::moderation::{NewReport, Report};
use crate::domain::post::{LinkPreview, Post, PostChange, PostDraft, PostPatch};
use crate::infra::db::Db;
use crate::infra::store::{PostStore, PostSubscription, ReportStore};

const CHANGE_CHANNEL: &str = "mural_posts";

const POST_COLUMNS: &str = "id, seq, message, author_name, author_id, parent_id, likes, dislikes, \
                            location, image_url, link_preview, created_at, edited_at";

#[derive(Clone)]
pub struct PgPostStore {
    db: Db,
}

#[derive(Deserialize)]
struct ChangeNotice {
    op: String,
    id: Uuid,
}

impl PgPostStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn fetch_all(&self) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM mural_posts ORDER BY created_at DESC, seq DESC",
            POST_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(post_from_row).collect()
    }
}

async fn fetch_one(db: &Db, id: Uuid) -> Result<Option<Post>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM mural_posts WHERE id = $1",
        POST_COLUMNS
    ))
    .bind(id)
    .fetch_optional(db.pool())
    .await?;

    row.as_ref().map(post_from_row).transpose()
}

fn post_from_row(row: &PgRow) -> Result<Post> {
    let id: Uuid = row.try_get("id")?;
    let parent_id: Option<Uuid> = row.try_get("parent_id")?;
    let link_preview: Option<Json<LinkPreview>> = row.try_get("link_preview")?;

    Ok(Post {
        id: id.to_string(),
        message: row.try_get("message")?,
        author_name: row.try_get("author_name")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
        seq: row.try_get("seq")?,
        edited_at: row.try_get("edited_at")?,
        parent_id: parent_id.map(|id| id.to_string()),
        likes: row.try_get("likes")?,
        dislikes: row.try_get("dislikes")?,
        location: row.try_get("location")?,
        image_url: row.try_get("image_url")?,
        link_preview: link_preview.map(|json| json.0),
    })
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| anyhow!("post {} not found", id))
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn create(&self, draft: PostDraft) -> Result<String> {
        let parent_id = draft.parent_id.as_deref().map(parse_id).transpose()?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO mural_posts \
                (message, author_name, author_id, parent_id, location, image_url, link_preview) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id",
        )
        .bind(draft.message)
        .bind(draft.author_name)
        .bind(draft.author_id)
        .bind(parent_id)
        .bind(draft.location)
        .bind(draft.image_url)
        .bind(draft.link_preview.map(Json))
        .fetch_one(self.db.pool())
        .await?;

        Ok(id.to_string())
    }

    async fn update(&self, id: &str, patch: PostPatch) -> Result<()> {
        let post_id = parse_id(id)?;
        let replace_preview = patch.link_preview.is_some();
        let preview = patch.link_preview.flatten().map(Json);

        let result = sqlx::query(
            "UPDATE mural_posts SET \
                message = COALESCE($2, message), \
                edited_at = CASE WHEN $2 IS NULL THEN edited_at ELSE now() END, \
                link_preview = CASE WHEN $3 THEN $4 ELSE link_preview END, \
                likes = GREATEST(likes + $5, 0), \
                dislikes = GREATEST(dislikes + $6, 0) \
             WHERE id = $1",
        )
        .bind(post_id)
        .bind(patch.message)
        .bind(replace_preview)
        .bind(preview)
        .bind(patch.likes_delta)
        .bind(patch.dislikes_delta)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("post {} not found", id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let post_id = parse_id(id)?;
        sqlx::query("DELETE FROM mural_posts WHERE id = $1")
            .bind(post_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<PostSubscription> {
        // LISTEN before the snapshot so nothing slips between them.
        let mut listener = PgListener::connect_with(self.db.pool()).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        let snapshot = self.fetch_all().await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(snapshot.into_iter().map(PostChange::Added).collect());

        let db = self.db.clone();
        let task = tokio::spawn(async move {
            loop {
                let notification = match listener.try_recv().await {
                    Ok(Some(notification)) => notification,
                    Ok(None) => {
                        warn!("post change listener lost its connection");
                        break;
                    }
                    Err(err) => {
                        warn!(error = ?err, "post change listener failed");
                        break;
                    }
                };

                let notice: ChangeNotice = match serde_json::from_str(notification.payload()) {
                    Ok(notice) => notice,
                    Err(err) => {
                        warn!(error = ?err, "unparseable post change notification");
                        continue;
                    }
                };

                let change = match notice.op.as_str() {
                    "removed" => Some(PostChange::Removed(notice.id.to_string())),
                    op => match fetch_one(&db, notice.id).await {
                        Ok(Some(post)) if op == "added" => Some(PostChange::Added(post)),
                        Ok(Some(post)) => Some(PostChange::Modified(post)),
                        // deleted before we could read it; the removal follows
                        Ok(None) => None,
                        Err(err) => {
                            warn!(error = ?err, post_id = %notice.id, "failed to load changed post");
                            break;
                        }
                    },
                };

                if let Some(change) = change {
                    if sender.send(vec![change]).is_err() {
                        debug!("post change receiver gone, stopping listener");
                        break;
                    }
                }
            }
        });

        Ok(PostSubscription::new(receiver, move || task.abort()))
    }
}

#[derive(Clone)]
pub struct PgReportStore {
    db: Db,
}

impl PgReportStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn record(&self, report: NewReport) -> Result<Report> {
        let post_id = parse_id(&report.post_id)?;
        let row = sqlx::query(
            "INSERT INTO mural_reports (post_id, reporter_id) VALUES ($1, $2) \
             RETURNING post_id, reporter_id, reported_at",
        )
        .bind(post_id)
        .bind(&report.reporter_id)
        .fetch_one(self.db.pool())
        .await?;

        let post_id: Uuid = row.get("post_id");
        Ok(Report {
            post_id: post_id.to_string(),
            reporter_id: row.get("reporter_id"),
            reported_at: row.get("reported_at"),
        })
    }
}
