#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use url::Url;

use mural::app::engine::{EngineDeps, MuralEngine, MuralSettings};
use mural::app::identity::IdentityStore;
use mural::app::preview::LinkPreviewResolver;
use mural::infra::clock::{Clock, SystemClock};
use mural::infra::fetch::PageFetcher;
use mural::infra::geo::DisabledGeocoder;
use mural::infra::memory_store::{MemoryPostStore, MemoryReportStore};
use mural::infra::prefs::PrefsFile;
use mural::AppState;

pub const ADMIN_UID: &str = "uid-admin";

/// Serves the same small page for every URL and counts requests.
pub struct StaticPages {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PageFetcher for StaticPages {
    async fn fetch(&self, _url: &Url) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(r#"<html><head>
            <meta property="og:title" content="Example Domain">
            <meta property="og:description" content="Illustrative examples">
            </head><body></body></html>"#
            .to_string())
    }
}

/// One wall view over an in-memory store. Each test builds its own, since
/// engine tasks live on the runtime of the test that spawned them.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: MemoryPostStore,
    pub reports: MemoryReportStore,
    pub pages: Arc<StaticPages>,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub async fn app() -> TestApp {
    TestApp::setup(MemoryPostStore::new()).await
}

impl TestApp {
    /// Another wall view sharing this app's store, as a second browser would.
    pub async fn second_viewer(&self) -> TestApp {
        TestApp::setup(self.store.clone()).await
    }

    async fn setup(store: MemoryPostStore) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let reports = MemoryReportStore::with_clock(clock.clone());
        let pages = Arc::new(StaticPages {
            calls: AtomicUsize::new(0),
        });

        let engine = MuralEngine::new(
            EngineDeps {
                store: Arc::new(store.clone()),
                reports: Arc::new(reports.clone()),
                identity: IdentityStore::open(PrefsFile::memory_only()).await,
                resolver: LinkPreviewResolver::new(pages.clone()),
                geocoder: Arc::new(DisabledGeocoder),
                clock,
            },
            MuralSettings {
                admin_uid: Some(ADMIN_UID.to_string()),
                resubscribe_backoff: Duration::from_millis(10),
                tick_interval: Duration::from_millis(50),
                ..MuralSettings::default()
            },
        )
        .await;
        engine.start().await.expect("engine failed to start");

        let state = AppState {
            engine,
            db: None,
            cache: None,
        };
        let router = mural::http::router(state.clone());
        let app = TestApp {
            router,
            state,
            store,
            reports,
            pages,
        };
        app.wait_for_view(|view| view["connected"] == true).await;
        app
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None, &[]).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::POST, path, Some(body), &[]).await
    }

    pub async fn post(&self, path: &str) -> TestResponse {
        self.request(Method::POST, path, None, &[]).await
    }

    pub async fn patch_json(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::PATCH, path, Some(body), &[]).await
    }

    pub async fn put_json(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, path, Some(body), &[]).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(Method::DELETE, path, None, &[]).await
    }

    /// Polls `GET /mural` until `predicate` holds, returning that view.
    pub async fn wait_for_view<F>(&self, predicate: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        for _ in 0..200 {
            let view = self.get("/mural").await.json();
            if predicate(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("view never reached the expected state");
    }

    /// Posts a root message and waits until it is on screen. Returns its id.
    pub async fn create_post(&self, name: &str, message: &str) -> String {
        let resp = self
            .post_json(
                "/mural/posts",
                serde_json::json!({ "display_name": name, "message": message }),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error_message());
        let id = resp.json()["id"].as_str().unwrap().to_string();
        self.wait_until_visible(&id).await;
        id
    }

    pub async fn create_reply(&self, name: &str, message: &str, parent_id: &str) -> String {
        let resp = self
            .post_json(
                "/mural/posts",
                serde_json::json!({
                    "display_name": name,
                    "message": message,
                    "parent_id": parent_id,
                }),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error_message());
        let id = resp.json()["id"].as_str().unwrap().to_string();
        self.wait_until_visible(&id).await;
        id
    }

    pub async fn wait_until_visible(&self, id: &str) -> Value {
        self.wait_for_view(|view| find_post(view, id).is_some()).await
    }

    pub fn page_fetches(&self) -> usize {
        self.pages.calls.load(Ordering::SeqCst)
    }
}

/// Looks a post up among the rendered roots and their replies.
pub fn find_post<'a>(view: &'a Value, id: &str) -> Option<&'a Value> {
    view["posts"].as_array()?.iter().find_map(|root| {
        if root["id"] == id {
            return Some(root);
        }
        root["replies"]
            .as_array()?
            .iter()
            .find(|reply| reply["id"] == id)
    })
}
