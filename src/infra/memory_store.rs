use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::moderation::{NewReport, Report};
use crate::domain::post::{Post, PostChange, PostDraft, PostPatch};
use crate::infra::clock::{Clock, SystemClock};
use crate::infra::store::{PostStore, PostSubscription, ReportStore};

/// In-process post collection with the same change-feed contract as the
/// Postgres adapter. Backs `STORE_BACKEND=memory` and the test suites.
#[derive(Clone)]
pub struct MemoryPostStore {
    inner: Arc<Mutex<MemoryInner>>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct MemoryInner {
    posts: HashMap<String, Post>,
    next_seq: i64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Vec<PostChange>>>,
    next_subscriber: u64,
    failures: Failures,
}

/// Writes the store refuses, for exercising failure paths.
#[derive(Default)]
struct Failures {
    create: bool,
    subscribe: bool,
    writes: HashSet<String>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner::default())),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, id: &str) -> Option<Post> {
        self.lock().posts.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// Failure switches for the error-path tests. Public so the HTTP integration
/// tests can reach them; the server never calls them.
impl MemoryPostStore {
    pub fn fail_creates(&self, fail: bool) {
        self.lock().failures.create = fail;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.lock().failures.subscribe = fail;
    }

    /// Updates and deletes targeting `id` fail until [`Self::heal`] is called.
    pub fn fail_writes_to(&self, id: &str) {
        self.lock().failures.writes.insert(id.to_string());
    }

    pub fn heal(&self, id: &str) {
        self.lock().failures.writes.remove(id);
    }

    /// Closes every live feed as if the connection dropped.
    pub fn drop_subscribers(&self) {
        self.lock().subscribers.clear();
    }
}

impl Default for MemoryPostStore {
    fn default() -> Self {
        Self::new()
    }
}

fn broadcast(inner: &mut MemoryInner, changes: Vec<PostChange>) {
    inner
        .subscribers
        .retain(|_, sender| sender.send(changes.clone()).is_ok());
}

fn check_write(inner: &MemoryInner, id: &str) -> Result<()> {
    if inner.failures.writes.contains(id) {
        return Err(anyhow!("write to post {} rejected", id));
    }
    Ok(())
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn create(&self, draft: PostDraft) -> Result<String> {
        let created_at = self.clock.now();
        let mut inner = self.lock();
        if inner.failures.create {
            return Err(anyhow!("create rejected"));
        }

        inner.next_seq += 1;
        let post = Post {
            id: Uuid::new_v4().simple().to_string(),
            message: draft.message,
            author_name: draft.author_name,
            author_id: draft.author_id,
            created_at,
            seq: inner.next_seq,
            edited_at: None,
            parent_id: draft.parent_id,
            likes: 0,
            dislikes: 0,
            location: draft.location,
            image_url: draft.image_url,
            link_preview: draft.link_preview,
        };
        let id = post.id.clone();
        inner.posts.insert(id.clone(), post.clone());
        broadcast(&mut inner, vec![PostChange::Added(post)]);
        Ok(id)
    }

    async fn update(&self, id: &str, patch: PostPatch) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.lock();
        check_write(&inner, id)?;

        let post = inner
            .posts
            .get_mut(id)
            .ok_or_else(|| anyhow!("post {} not found", id))?;
        if let Some(message) = patch.message {
            post.message = message;
            post.edited_at = Some(now);
        }
        if let Some(preview) = patch.link_preview {
            post.link_preview = preview;
        }
        post.likes = (post.likes + patch.likes_delta).max(0);
        post.dislikes = (post.dislikes + patch.dislikes_delta).max(0);

        let post = post.clone();
        broadcast(&mut inner, vec![PostChange::Modified(post)]);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.lock();
        check_write(&inner, id)?;

        if inner.posts.remove(id).is_some() {
            broadcast(&mut inner, vec![PostChange::Removed(id.to_string())]);
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<PostSubscription> {
        let mut inner = self.lock();
        if inner.failures.subscribe {
            return Err(anyhow!("subscription refused"));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let mut snapshot: Vec<Post> = inner.posts.values().cloned().collect();
        snapshot.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.seq.cmp(&a.seq)));
        let _ = sender.send(snapshot.into_iter().map(PostChange::Added).collect());

        inner.next_subscriber += 1;
        let subscriber_id = inner.next_subscriber;
        inner.subscribers.insert(subscriber_id, sender);

        let registry = Arc::clone(&self.inner);
        Ok(PostSubscription::new(receiver, move || {
            let mut inner = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            inner.subscribers.remove(&subscriber_id);
        }))
    }
}

#[derive(Clone)]
pub struct MemoryReportStore {
    reports: Arc<Mutex<Vec<Report>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            reports: Arc::new(Mutex::new(Vec::new())),
            clock,
        }
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn record(&self, report: NewReport) -> Result<Report> {
        let report = Report {
            post_id: report.post_id,
            reporter_id: report.reporter_id,
            reported_at: self.clock.now(),
        };
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(report.clone());
        Ok(report)
    }
}
