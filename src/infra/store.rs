use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::moderation::{NewReport, Report};
use crate::domain::post::{PostChange, PostDraft, PostPatch};

/// Remote post collection. Implementations do not retry.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Returns the generated id. `created_at` and `seq` are assigned by the store.
    async fn create(&self, draft: PostDraft) -> Result<String>;

    /// Partial merge. Counter deltas are applied atomically and clamped at zero.
    async fn update(&self, id: &str, patch: PostPatch) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Live feed ordered by `created_at` descending. The first batch holds every
    /// existing post as `Added`.
    async fn subscribe(&self) -> Result<PostSubscription>;
}

/// Append-only report log.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn record(&self, report: NewReport) -> Result<Report>;
}

type Teardown = Box<dyn FnOnce() + Send>;

/// Handle on an active live feed. Tears down exactly once, either through
/// [`PostSubscription::unsubscribe`] or on drop.
pub struct PostSubscription {
    changes: mpsc::UnboundedReceiver<Vec<PostChange>>,
    teardown: Option<Teardown>,
}

impl PostSubscription {
    pub fn new(
        changes: mpsc::UnboundedReceiver<Vec<PostChange>>,
        teardown: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            changes,
            teardown: Some(Box::new(teardown)),
        }
    }

    /// `None` once the feed has dropped.
    pub async fn next_batch(&mut self) -> Option<Vec<PostChange>> {
        self.changes.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.run_teardown();
    }

    fn run_teardown(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for PostSubscription {
    fn drop(&mut self) {
        self.run_teardown();
    }
}

impl std::fmt::Debug for PostSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostSubscription")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}
