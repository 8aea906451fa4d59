//! The wall controller: one instance per mounted wall view.
//!
//! Reads flow store feed -> `posts` mirror -> tree/sort/page -> rendered view.
//! Writes are validated here and sent to the store. The mirror itself only
//! changes when the feed reports back; votes additionally keep a transient
//! overlay of local deltas that the next authoritative change for the post
//! replaces.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, Weak};
use time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::app::attachments::{prepare_image, ImageLimits};
use crate::app::identity::IdentityStore;
use crate::app::permissions::{edit_time_left, permissions, SessionUser, Viewer};
use crate::app::preview::LinkPreviewResolver;
use crate::app::render::{RenderContext, RenderedPage};
use crate::app::tree::{build_tree, descendants, page_window, sort_roots};
use crate::config::AppConfig;
use crate::domain::error::{MuralError, MuralResult};
use crate::domain::moderation::NewReport;
use crate::domain::post::{Coordinates, Post, PostChange, PostDraft, PostPatch, SortOrder};
use crate::domain::vote::{VoteKind, VoteTransition};
use crate::infra::clock::Clock;
use crate::infra::geo::Geocoder;
use crate::infra::prefs::LocalPrefs;
use crate::infra::store::{PostStore, PostSubscription, ReportStore};

const NOTICE_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct MuralSettings {
    pub edit_window: Duration,
    pub page_size: usize,
    pub max_message_chars: usize,
    pub max_name_chars: usize,
    pub image_limits: ImageLimits,
    pub admin_uid: Option<String>,
    pub resubscribe_backoff: std::time::Duration,
    pub tick_interval: std::time::Duration,
}

impl MuralSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            edit_window: Duration::seconds(config.edit_window_seconds),
            page_size: config.page_size,
            max_message_chars: config.max_message_chars,
            max_name_chars: config.max_name_chars,
            image_limits: ImageLimits {
                max_bytes: config.image_max_bytes,
                max_dimension: config.image_max_dimension,
            },
            admin_uid: config.admin_uid.clone(),
            ..Self::default()
        }
    }
}

impl Default for MuralSettings {
    fn default() -> Self {
        Self {
            edit_window: Duration::seconds(60),
            page_size: 10,
            max_message_chars: 500,
            max_name_chars: 15,
            image_limits: ImageLimits {
                max_bytes: 5 * 1024 * 1024,
                max_dimension: 800,
            },
            admin_uid: None,
            resubscribe_backoff: std::time::Duration::from_secs(2),
            tick_interval: std::time::Duration::from_secs(1),
        }
    }
}

pub struct EngineDeps {
    pub store: Arc<dyn PostStore>,
    pub reports: Arc<dyn ReportStore>,
    pub identity: IdentityStore,
    pub resolver: LinkPreviewResolver,
    pub geocoder: Arc<dyn Geocoder>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub message: String,
    pub display_name: String,
    pub parent_id: Option<String>,
    pub coords: Option<Coordinates>,
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient toast for the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    Reported,
    AlreadyReported,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct VoteDelta {
    likes: i64,
    dislikes: i64,
}

struct MuralState {
    posts: HashMap<String, Post>,
    overlay: HashMap<String, VoteDelta>,
    sort: SortOrder,
    page: usize,
    viewer: Viewer,
    reply_target: Option<String>,
    connected: bool,
    awaiting_snapshot: bool,
}

impl MuralState {
    fn post(&self, id: &str) -> MuralResult<&Post> {
        self.posts
            .get(id)
            .ok_or_else(|| MuralError::NotFound(id.to_string()))
    }

    /// Authoritative posts with pending vote deltas merged in.
    fn effective_posts(&self) -> HashMap<String, Post> {
        self.posts
            .iter()
            .map(|(id, post)| {
                let mut post = post.clone();
                if let Some(delta) = self.overlay.get(id) {
                    post.likes = (post.likes + delta.likes).max(0);
                    post.dislikes = (post.dislikes + delta.dislikes).max(0);
                }
                (id.clone(), post)
            })
            .collect()
    }
}

struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

type PendingSet = Arc<std::sync::Mutex<HashSet<String>>>;

fn lock_pending(set: &PendingSet) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds a post id in an in-flight set until dropped, so a cancelled caller
/// never leaves the post locked.
struct PendingClaim {
    set: PendingSet,
    post_id: String,
}

impl PendingClaim {
    fn claim(set: &PendingSet, post_id: &str) -> Option<Self> {
        if !lock_pending(set).insert(post_id.to_string()) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            post_id: post_id.to_string(),
        })
    }
}

impl Drop for PendingClaim {
    fn drop(&mut self) {
        lock_pending(&self.set).remove(&self.post_id);
    }
}

pub struct MuralEngine {
    me: Weak<MuralEngine>,
    store: Arc<dyn PostStore>,
    reports: Arc<dyn ReportStore>,
    identity: IdentityStore,
    resolver: LinkPreviewResolver,
    geocoder: Arc<dyn Geocoder>,
    clock: Arc<dyn Clock>,
    settings: MuralSettings,
    anonymous_id: String,
    state: Mutex<MuralState>,
    submitting: AtomicBool,
    voting: PendingSet,
    reporting: PendingSet,
    feed: Mutex<Option<JoinHandle<()>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    view_tx: watch::Sender<RenderedPage>,
    notices: broadcast::Sender<Notice>,
}

impl MuralEngine {
    /// Builds the engine without touching the store; call [`Self::start`] once
    /// the front end is ready to receive views.
    pub async fn new(deps: EngineDeps, settings: MuralSettings) -> Arc<Self> {
        let anonymous_id = deps.identity.get_or_create_author_id().await;
        let prefs = deps.identity.snapshot().await;
        let state = MuralState {
            posts: HashMap::new(),
            overlay: HashMap::new(),
            sort: SortOrder::Recent,
            page: 1,
            viewer: Viewer::anonymous(anonymous_id.clone()),
            reply_target: None,
            connected: false,
            awaiting_snapshot: true,
        };

        let (initial, _) = render(&state, &prefs, &HashSet::new(), deps.clock.now(), &settings);
        let (view_tx, _) = watch::channel(initial);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store: deps.store,
            reports: deps.reports,
            identity: deps.identity,
            resolver: deps.resolver,
            geocoder: deps.geocoder,
            clock: deps.clock,
            settings,
            anonymous_id,
            state: Mutex::new(state),
            submitting: AtomicBool::new(false),
            voting: PendingSet::default(),
            reporting: PendingSet::default(),
            feed: Mutex::new(None),
            ticker: Mutex::new(None),
            view_tx,
            notices,
        })
    }

    /// Opens the live feed. Any previous feed is torn down first, so at most
    /// one subscription is ever active.
    pub async fn start(&self) -> MuralResult<()> {
        let mut feed = self.feed.lock().await;
        if let Some(previous) = feed.take() {
            previous.abort();
            debug!("replaced previous post feed");
        }

        let subscription = self
            .store
            .subscribe()
            .await
            .map_err(MuralError::StoreSubscription)?;
        self.state.lock().await.awaiting_snapshot = true;
        *feed = Some(tokio::spawn(run_feed(self.me.clone(), subscription)));
        info!("mural feed started");
        Ok(())
    }

    /// Tears down the feed and the countdown timer. Safe to call repeatedly.
    pub async fn dispose(&self) {
        if let Some(feed) = self.feed.lock().await.take() {
            feed.abort();
            info!("mural feed stopped");
        }
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.abort();
        }
        self.state.lock().await.connected = false;
        self.publish_view().await;
    }

    pub fn watch_view(&self) -> watch::Receiver<RenderedPage> {
        self.view_tx.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Fresh render at the current instant.
    pub async fn view(&self) -> RenderedPage {
        let prefs = self.identity.snapshot().await;
        let voting = lock_pending(&self.voting).clone();
        let state = self.state.lock().await;
        render(&state, &prefs, &voting, self.clock.now(), &self.settings).0
    }

    pub async fn ticker_running(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|ticker| !ticker.is_finished())
    }

    pub async fn viewer(&self) -> Viewer {
        self.state.lock().await.viewer.clone()
    }

    /// Name to prefill the form with: the signed-in user's, else the last one used.
    pub async fn default_display_name(&self) -> Option<String> {
        let session = self.state.lock().await.viewer.session.clone();
        match session {
            Some(session) => Some(
                session
                    .display_name
                    .trim()
                    .chars()
                    .take(self.settings.max_name_chars)
                    .collect(),
            ),
            None => self.identity.display_name().await,
        }
    }

    pub async fn sign_in(&self, user: SessionUser) {
        let is_admin = self.settings.admin_uid.as_deref() == Some(user.user_id.as_str());
        info!(user_id = %user.user_id, is_admin, "viewer signed in");
        self.state.lock().await.viewer = Viewer {
            author_id: user.user_id.clone(),
            session: Some(user),
            is_admin,
        };
        self.refresh().await;
    }

    pub async fn sign_out(&self) {
        self.state.lock().await.viewer = Viewer::anonymous(self.anonymous_id.clone());
        self.refresh().await;
    }

    pub async fn set_sort_order(&self, order: SortOrder) {
        {
            let mut state = self.state.lock().await;
            state.sort = order;
            state.page = 1;
        }
        self.refresh().await;
    }

    pub async fn set_page(&self, page: usize) -> MuralResult<()> {
        {
            let mut state = self.state.lock().await;
            let roots = build_tree(&state.posts).roots.len();
            let total_pages = page_window(roots, 1, self.settings.page_size).total_pages;
            if page == 0 || page > total_pages {
                return Err(MuralError::validation(format!(
                    "page must be between 1 and {}",
                    total_pages
                )));
            }
            state.page = page;
        }
        self.refresh().await;
        Ok(())
    }

    pub async fn start_reply(&self, post_id: &str) -> MuralResult<()> {
        {
            let mut state = self.state.lock().await;
            state.post(post_id)?;
            state.reply_target = Some(post_id.to_string());
        }
        self.refresh().await;
        Ok(())
    }

    pub async fn cancel_reply(&self) {
        self.state.lock().await.reply_target = None;
        self.refresh().await;
    }

    pub async fn submit(&self, request: SubmitRequest) -> MuralResult<String> {
        if self.submitting.swap(true, Ordering::SeqCst) {
            return Err(MuralError::InFlight("submission"));
        }
        let _guard = SubmitGuard(&self.submitting);

        let message = request.message.trim().to_string();
        let display_name = request.display_name.trim().to_string();
        if message.is_empty() || display_name.is_empty() {
            return Err(MuralError::validation("please fill in your name and message"));
        }
        self.check_lengths(&message, Some(&display_name))?;

        let author_id = {
            let state = self.state.lock().await;
            if let Some(parent_id) = &request.parent_id {
                state.post(parent_id)?;
            }
            state.viewer.author_id.clone()
        };

        let image_url = match request.image {
            Some(bytes) => {
                let limits = self.settings.image_limits;
                let prepared = tokio::task::spawn_blocking(move || prepare_image(&bytes, limits))
                    .await
                    .map_err(|err| MuralError::validation(format!("failed to process image: {}", err)))??;
                Some(prepared)
            }
            None => None,
        };

        let (location, link_preview) =
            tokio::join!(self.locate(request.coords), self.resolver.resolve(&message));

        let draft = PostDraft {
            message,
            author_name: display_name.clone(),
            author_id,
            parent_id: request.parent_id,
            location,
            image_url,
            link_preview,
        };

        match self.store.create(draft).await {
            Ok(id) => {
                info!(post_id = %id, "post created");
                self.identity.remember_display_name(&display_name).await;
                self.state.lock().await.reply_target = None;
                self.notify(NoticeLevel::Success, "Message posted");
                self.refresh().await;
                Ok(id)
            }
            Err(err) => {
                error!(error = ?err, "failed to create post");
                self.notify(NoticeLevel::Error, "Could not post your message, please try again");
                Err(MuralError::StoreWrite(err))
            }
        }
    }

    pub async fn edit(&self, post_id: &str, new_message: &str) -> MuralResult<()> {
        let message = new_message.trim().to_string();
        if message.is_empty() {
            return Err(MuralError::validation("message cannot be empty"));
        }
        self.check_lengths(&message, None)?;

        {
            let state = self.state.lock().await;
            let post = state.post(post_id)?;
            let now = self.clock.now();
            if edit_time_left(post, &state.viewer, now, self.settings.edit_window).is_none() {
                return Err(MuralError::EditWindowClosed(post_id.to_string()));
            }
        }

        let link_preview = self.resolver.resolve(&message).await;
        match self
            .store
            .update(post_id, PostPatch::edit(message, link_preview))
            .await
        {
            Ok(()) => {
                info!(post_id, "post edited");
                self.notify(NoticeLevel::Success, "Message updated");
                Ok(())
            }
            Err(err) => {
                error!(error = ?err, post_id, "failed to edit post");
                self.notify(NoticeLevel::Error, "Could not update the message");
                Err(MuralError::StoreWrite(err))
            }
        }
    }

    /// Dismisses a post's link preview card.
    pub async fn clear_preview(&self, post_id: &str) -> MuralResult<()> {
        {
            let state = self.state.lock().await;
            let post = state.post(post_id)?;
            let perms = permissions(
                post,
                &state.viewer,
                self.clock.now(),
                self.settings.edit_window,
                false,
            );
            if !perms.can_clear_preview {
                return Err(MuralError::Forbidden("cannot remove this preview".to_string()));
            }
        }

        self.store
            .update(post_id, PostPatch::clear_preview())
            .await
            .map_err(|err| {
                warn!(error = ?err, post_id, "failed to clear link preview");
                self.notify(NoticeLevel::Error, "Could not remove the preview");
                MuralError::StoreWrite(err)
            })
    }

    /// Deletes a post and every reply under it, replies first. `confirmed`
    /// must carry the user's explicit confirmation.
    pub async fn delete(&self, post_id: &str, confirmed: bool) -> MuralResult<()> {
        if !confirmed {
            return Err(MuralError::Unconfirmed);
        }

        let replies = {
            let state = self.state.lock().await;
            let post = state.post(post_id)?;
            let perms = permissions(
                post,
                &state.viewer,
                self.clock.now(),
                self.settings.edit_window,
                false,
            );
            if !perms.can_delete {
                return Err(if state.viewer.owns(post) {
                    MuralError::EditWindowClosed(post_id.to_string())
                } else {
                    MuralError::Forbidden("only the author or an admin can delete this".to_string())
                });
            }
            descendants(&state.posts, post_id)
        };

        let results = join_all(replies.iter().map(|id| self.store.delete(id))).await;
        let mut failed = 0;
        for (id, result) in replies.iter().zip(results) {
            if let Err(err) = result {
                failed += 1;
                warn!(error = ?err, post_id = %id, "failed to delete reply");
            }
        }

        if let Err(err) = self.store.delete(post_id).await {
            error!(error = ?err, post_id, "failed to delete post");
            self.notify(NoticeLevel::Error, "Could not delete the message");
            return Err(MuralError::StoreWrite(err));
        }

        if failed > 0 {
            self.notify(NoticeLevel::Error, "Message deleted, but some replies could not be");
            return Err(MuralError::PartialDelete {
                failed,
                total: replies.len(),
            });
        }

        info!(post_id, replies = replies.len(), "post deleted");
        self.notify(NoticeLevel::Success, "Message deleted");
        Ok(())
    }

    /// Tri-state toggle. Returns the vote now held. The local count moves
    /// before the store acknowledges and is not rolled back if the write
    /// fails; the next authoritative change for the post corrects it.
    pub async fn vote(&self, post_id: &str, kind: VoteKind) -> MuralResult<Option<VoteKind>> {
        self.state.lock().await.post(post_id)?;
        let claim =
            PendingClaim::claim(&self.voting, post_id).ok_or(MuralError::InFlight("vote"))?;

        let current = self.identity.get_vote(post_id).await;
        let transition = VoteTransition::apply(current, kind);
        self.identity.set_vote(post_id, transition.next).await;
        {
            let mut state = self.state.lock().await;
            let delta = state.overlay.entry(post_id.to_string()).or_default();
            delta.likes += transition.likes_delta;
            delta.dislikes += transition.dislikes_delta;
        }
        self.refresh().await;

        // The counter write runs detached so a cancelled caller cannot strand
        // the optimistic delta without its matching store update.
        let store = Arc::clone(&self.store);
        let me = self.me.clone();
        let id = post_id.to_string();
        let patch = PostPatch::counters(transition.likes_delta, transition.dislikes_delta);
        let write = tokio::spawn(async move {
            let result = store.update(&id, patch).await;
            drop(claim);
            if let Some(engine) = me.upgrade() {
                engine.refresh().await;
            }
            result
        });
        let result = write
            .await
            .unwrap_or_else(|err| Err(anyhow::anyhow!("vote write task failed: {err}")));

        match result {
            Ok(()) => {
                debug!(post_id, vote = ?transition.next, "vote recorded");
                Ok(transition.next)
            }
            Err(err) => {
                warn!(error = ?err, post_id, "vote write failed, local count may drift");
                Err(MuralError::StoreWrite(err))
            }
        }
    }

    pub async fn report(&self, post_id: &str) -> MuralResult<ReportOutcome> {
        if self.identity.has_reported(post_id).await {
            return Ok(ReportOutcome::AlreadyReported);
        }

        let reporter_id = {
            let state = self.state.lock().await;
            state.post(post_id)?;
            state.viewer.author_id.clone()
        };
        let _claim =
            PendingClaim::claim(&self.reporting, post_id).ok_or(MuralError::InFlight("report"))?;
        // an earlier report may have finished while this one waited
        if self.identity.has_reported(post_id).await {
            return Ok(ReportOutcome::AlreadyReported);
        }

        let result = self
            .reports
            .record(NewReport {
                post_id: post_id.to_string(),
                reporter_id,
            })
            .await;

        match result {
            Ok(_) => {
                self.identity.mark_reported(post_id).await;
                info!(post_id, "post reported");
                self.notify(NoticeLevel::Success, "Thanks, the message was reported");
                self.refresh().await;
                Ok(ReportOutcome::Reported)
            }
            Err(err) => {
                error!(error = ?err, post_id, "failed to report post");
                self.notify(NoticeLevel::Error, "Could not report the message");
                Err(MuralError::StoreWrite(err))
            }
        }
    }

    fn check_lengths(&self, message: &str, display_name: Option<&str>) -> MuralResult<()> {
        if message.chars().count() > self.settings.max_message_chars {
            return Err(MuralError::validation(format!(
                "message must be at most {} characters",
                self.settings.max_message_chars
            )));
        }
        if let Some(name) = display_name {
            if name.chars().count() > self.settings.max_name_chars {
                return Err(MuralError::validation(format!(
                    "name must be at most {} characters",
                    self.settings.max_name_chars
                )));
            }
        }
        Ok(())
    }

    async fn locate(&self, coords: Option<Coordinates>) -> Option<String> {
        let coords = coords?;
        match self.geocoder.reverse(coords).await {
            Ok(location) => location,
            Err(err) => {
                debug!(error = ?err, "geolocation unavailable");
                None
            }
        }
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        let _ = self.notices.send(Notice {
            level,
            message: message.to_string(),
        });
    }

    async fn apply_changes(&self, batch: Vec<PostChange>) {
        {
            let mut state = self.state.lock().await;
            if state.awaiting_snapshot {
                state.posts.clear();
                state.overlay.clear();
                state.awaiting_snapshot = false;
            }
            state.connected = true;

            for change in batch {
                match change {
                    PostChange::Added(post) | PostChange::Modified(post) => {
                        state.overlay.remove(&post.id);
                        state.posts.insert(post.id.clone(), post);
                    }
                    PostChange::Removed(id) => {
                        state.overlay.remove(&id);
                        state.posts.remove(&id);
                        if state.reply_target.as_deref() == Some(id.as_str()) {
                            state.reply_target = None;
                        }
                    }
                }
            }
        }
        self.refresh().await;
    }

    async fn mark_disconnected(&self) {
        self.state.lock().await.connected = false;
        self.publish_view().await;
    }

    async fn resubscribe(&self) -> MuralResult<PostSubscription> {
        let subscription = self
            .store
            .subscribe()
            .await
            .map_err(MuralError::StoreSubscription)?;
        self.state.lock().await.awaiting_snapshot = true;
        Ok(subscription)
    }

    /// Renders and publishes; reports whether any visible post is still editable.
    async fn publish_view(&self) -> bool {
        let prefs = self.identity.snapshot().await;
        let voting = lock_pending(&self.voting).clone();
        let (page, editable) = {
            let state = self.state.lock().await;
            render(&state, &prefs, &voting, self.clock.now(), &self.settings)
        };
        self.view_tx.send_replace(page);
        editable
    }

    async fn refresh(&self) {
        if self.publish_view().await {
            self.ensure_ticker().await;
        }
    }

    async fn ensure_ticker(&self) {
        let mut ticker = self.ticker.lock().await;
        if ticker.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        debug!("starting edit countdown");
        *ticker = Some(tokio::spawn(run_ticker(
            self.me.clone(),
            self.settings.tick_interval,
        )));
    }
}

impl Drop for MuralEngine {
    fn drop(&mut self) {
        if let Some(feed) = self.feed.get_mut().take() {
            feed.abort();
        }
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
    }
}

fn render(
    state: &MuralState,
    prefs: &LocalPrefs,
    voting: &HashSet<String>,
    now: time::OffsetDateTime,
    settings: &MuralSettings,
) -> (RenderedPage, bool) {
    let effective = state.effective_posts();
    let mut tree = build_tree(&effective);
    sort_roots(&mut tree.roots, state.sort);
    let window = page_window(tree.roots.len(), state.page, settings.page_size);

    let ctx = RenderContext {
        viewer: &state.viewer,
        prefs,
        voting,
        now,
        edit_window: settings.edit_window,
    };
    let posts: Vec<_> = tree.roots[window.range.clone()]
        .iter()
        .map(|root| {
            let replies = tree
                .replies(&root.id)
                .iter()
                .map(|reply| ctx.render_post(reply, Vec::new(), false))
                .collect();
            ctx.render_post(root, replies, root.parent_id.is_some())
        })
        .collect();

    let editable = posts.iter().any(|post| {
        post.permissions.can_edit || post.replies.iter().any(|reply| reply.permissions.can_edit)
    });

    let page = RenderedPage {
        posts,
        sort: state.sort,
        page: state.page,
        total_pages: window.total_pages,
        total_roots: tree.roots.len(),
        empty: tree.roots.is_empty(),
        connected: state.connected,
        reply_target: state.reply_target.clone(),
        author_id: state.viewer.author_id.clone(),
        remembered_name: prefs.display_name.clone(),
        session: state.viewer.session.clone(),
        is_admin: state.viewer.is_admin,
    };
    (page, editable)
}

async fn run_feed(engine: Weak<MuralEngine>, first: PostSubscription) {
    let mut pending = Some(first);
    loop {
        let mut subscription = match pending.take() {
            Some(subscription) => subscription,
            None => {
                let Some(backoff) = engine.upgrade().map(|e| e.settings.resubscribe_backoff) else {
                    return;
                };
                tokio::time::sleep(backoff).await;
                let Some(strong) = engine.upgrade() else {
                    return;
                };
                match strong.resubscribe().await {
                    Ok(subscription) => {
                        info!("post feed re-established");
                        subscription
                    }
                    Err(err) => {
                        warn!(error = ?err, "post feed resubscribe failed, backing off");
                        continue;
                    }
                }
            }
        };

        while let Some(batch) = subscription.next_batch().await {
            let Some(strong) = engine.upgrade() else {
                return;
            };
            strong.apply_changes(batch).await;
        }

        subscription.unsubscribe();
        let Some(strong) = engine.upgrade() else {
            return;
        };
        warn!("post feed dropped");
        strong.mark_disconnected().await;
    }
}

async fn run_ticker(engine: Weak<MuralEngine>, period: std::time::Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(strong) = engine.upgrade() else {
            return;
        };
        let mut slot = strong.ticker.lock().await;
        if !strong.publish_view().await {
            debug!("no editable posts left, stopping edit countdown");
            slot.take();
            return;
        }
    }
}
