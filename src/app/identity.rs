use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::vote::VoteKind;
use crate::infra::prefs::{LocalPrefs, PrefsFile};

/// Pseudonymous identity plus per-post vote and report memory for this
/// device. Every mutation is written through immediately.
#[derive(Clone)]
pub struct IdentityStore {
    file: PrefsFile,
    prefs: Arc<Mutex<LocalPrefs>>,
}

impl IdentityStore {
    pub async fn open(file: PrefsFile) -> Self {
        let prefs = file.load().await;
        Self {
            file,
            prefs: Arc::new(Mutex::new(prefs)),
        }
    }

    pub async fn get_or_create_author_id(&self) -> String {
        let mut prefs = self.prefs.lock().await;
        if let Some(id) = &prefs.author_id {
            return id.clone();
        }

        let id = generate_author_id(OffsetDateTime::now_utc());
        debug!(author_id = %id, "generated anonymous author id");
        prefs.author_id = Some(id.clone());
        self.file.save(&prefs).await;
        id
    }

    pub async fn display_name(&self) -> Option<String> {
        self.prefs.lock().await.display_name.clone()
    }

    pub async fn remember_display_name(&self, name: &str) {
        let mut prefs = self.prefs.lock().await;
        if prefs.display_name.as_deref() == Some(name) {
            return;
        }
        prefs.display_name = Some(name.to_string());
        self.file.save(&prefs).await;
    }

    pub async fn get_vote(&self, post_id: &str) -> Option<VoteKind> {
        self.prefs.lock().await.votes.get(post_id).copied()
    }

    /// `None` forgets any vote held for the post.
    pub async fn set_vote(&self, post_id: &str, vote: Option<VoteKind>) {
        let mut prefs = self.prefs.lock().await;
        match vote {
            Some(kind) => {
                prefs.votes.insert(post_id.to_string(), kind);
            }
            None => {
                prefs.votes.remove(post_id);
            }
        }
        self.file.save(&prefs).await;
    }

    pub async fn has_reported(&self, post_id: &str) -> bool {
        self.prefs.lock().await.reported.contains(post_id)
    }

    /// One-way: there is no un-report.
    pub async fn mark_reported(&self, post_id: &str) {
        let mut prefs = self.prefs.lock().await;
        if prefs.reported.insert(post_id.to_string()) {
            self.file.save(&prefs).await;
        }
    }

    pub async fn snapshot(&self) -> LocalPrefs {
        self.prefs.lock().await.clone()
    }
}

fn generate_author_id(now: OffsetDateTime) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("anon_{}_{}", millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn author_id_is_stable_across_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let first = IdentityStore::open(PrefsFile::new(&path)).await;
        let id = first.get_or_create_author_id().await;
        assert!(id.starts_with("anon_"));
        assert_eq!(first.get_or_create_author_id().await, id);

        let reloaded = IdentityStore::open(PrefsFile::new(&path)).await;
        assert_eq!(reloaded.get_or_create_author_id().await, id);
    }

    #[tokio::test]
    async fn set_vote_overwrites_and_clears() {
        let store = IdentityStore::open(PrefsFile::memory_only()).await;
        store.set_vote("p1", Some(VoteKind::Like)).await;
        store.set_vote("p1", Some(VoteKind::Dislike)).await;
        assert_eq!(store.get_vote("p1").await, Some(VoteKind::Dislike));

        store.set_vote("p1", None).await;
        assert_eq!(store.get_vote("p1").await, None);
    }

    #[tokio::test]
    async fn reports_persist_one_way() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let store = IdentityStore::open(PrefsFile::new(&path)).await;
        assert!(!store.has_reported("p9").await);

        store.mark_reported("p9").await;
        let reloaded = IdentityStore::open(PrefsFile::new(&path)).await;
        assert!(reloaded.has_reported("p9").await);
    }

    #[tokio::test]
    async fn unavailable_storage_behaves_like_a_new_session() {
        let store = IdentityStore::open(PrefsFile::memory_only()).await;
        let id = store.get_or_create_author_id().await;

        let other = IdentityStore::open(PrefsFile::memory_only()).await;
        assert_ne!(other.get_or_create_author_id().await, id);
    }
}
