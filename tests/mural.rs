//! Wall Tests
//!
//! Covers posting, replies, editing, deleting, previews and paging over HTTP.

mod common;

use axum::http::StatusCode;
use common::{app, find_post};
use serde_json::json;

// ===========================================================================
// Health and empty wall
// ===========================================================================

#[tokio::test]
async fn health_reports_ok_on_memory_store() {
    let app = app().await;
    let resp = app.get("/health").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["status"], "ok");
}

#[tokio::test]
async fn fresh_wall_is_empty() {
    let app = app().await;
    let view = app.get("/mural").await.json();
    assert_eq!(view["empty"], true);
    assert_eq!(view["total_pages"], 1);
    assert_eq!(view["sort"], "recent");
    assert!(view["author_id"].as_str().unwrap().starts_with("anon_"));
}

// ===========================================================================
// Posting
// ===========================================================================

#[tokio::test]
async fn new_post_appears_first() {
    let app = app().await;
    app.create_post("Ana", "first").await;
    let second = app.create_post("Ana", "second").await;

    let view = app.get("/mural").await.json();
    assert_eq!(view["total_roots"], 2);
    assert_eq!(view["posts"][0]["id"], second.as_str());
    assert_eq!(view["posts"][0]["message_html"], "second");
    assert_eq!(view["posts"][0]["is_reply"], false);
    assert_eq!(view["posts"][0]["permissions"]["can_edit"], true);
    assert_eq!(view["remembered_name"], "Ana");
}

#[tokio::test]
async fn message_markup_is_escaped() {
    let app = app().await;
    let id = app.create_post("<i>Eve</i>", "<script>alert(1)</script>").await;

    let view = app.get("/mural").await.json();
    let post = find_post(&view, &id).unwrap();
    assert_eq!(post["message_html"], "&lt;script&gt;alert(1)&lt;/script&gt;");
    assert_eq!(post["author_name"], "&lt;i&gt;Eve&lt;/i&gt;");
}

#[tokio::test]
async fn missing_name_is_rejected_without_writes() {
    let app = app().await;
    let resp = app
        .post_json("/mural/posts", json!({ "message": "https://example.com" }))
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "please fill in your name and message");
    assert!(app.store.is_empty());
    assert_eq!(app.page_fetches(), 0);
}

#[tokio::test]
async fn remembered_name_fills_in_when_omitted() {
    let app = app().await;
    app.create_post("Ana", "hello").await;

    let resp = app
        .post_json("/mural/posts", json!({ "message": "again" }))
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let id = resp.json()["id"].as_str().unwrap().to_string();
    assert_eq!(app.store.get(&id).unwrap().author_name, "Ana");
}

#[tokio::test]
async fn overlong_message_is_rejected() {
    let app = app().await;
    let resp = app
        .post_json(
            "/mural/posts",
            json!({ "display_name": "Ana", "message": "a".repeat(501) }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "message must be at most 500 characters");
}

#[tokio::test]
async fn bad_image_encoding_is_rejected() {
    let app = app().await;
    let resp = app
        .post_json(
            "/mural/posts",
            json!({ "display_name": "Ana", "message": "pic", "image": "%%%" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "invalid image encoding");
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn links_get_a_preview_card() {
    let app = app().await;
    let id = app.create_post("Ana", "look https://example.com/page").await;

    let view = app.get("/mural").await.json();
    let post = find_post(&view, &id).unwrap();
    assert_eq!(post["link_preview"]["title"], "Example Domain");
    assert_eq!(post["link_preview"]["description"], "Illustrative examples");
    assert!(post["message_html"]
        .as_str()
        .unwrap()
        .contains("<a href=\"https://example.com/page\""));
    assert_eq!(app.page_fetches(), 1);

    let resp = app.delete(&format!("/mural/posts/{}/preview", id)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    let view = app
        .wait_for_view(|view| find_post(view, &id).is_some_and(|p| p["link_preview"].is_null()))
        .await;
    assert_eq!(find_post(&view, &id).unwrap()["permissions"]["can_clear_preview"], false);
}

#[tokio::test]
async fn image_links_get_no_preview() {
    let app = app().await;
    let id = app.create_post("Ana", "https://example.com/cat.png").await;

    let view = app.get("/mural").await.json();
    assert!(find_post(&view, &id).unwrap()["link_preview"].is_null());
    assert_eq!(app.page_fetches(), 0);
}

// ===========================================================================
// Replies
// ===========================================================================

#[tokio::test]
async fn replies_nest_under_their_root() {
    let app = app().await;
    let root = app.create_post("Ana", "root").await;

    let resp = app.post(&format!("/mural/reply/{}", root)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["reply_target"], root.as_str());

    let first = app.create_reply("Bo", "first reply", &root).await;
    let second = app.create_reply("Cy", "reply to reply", &first).await;

    let view = app.get("/mural").await.json();
    assert_eq!(view["total_roots"], 1);
    assert!(view["reply_target"].is_null());
    let replies = view["posts"][0]["replies"].as_array().unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], first.as_str());
    assert_eq!(replies[1]["id"], second.as_str());
    assert_eq!(replies[0]["is_reply"], true);
}

#[tokio::test]
async fn reply_mode_can_be_cancelled() {
    let app = app().await;
    let root = app.create_post("Ana", "root").await;
    app.post(&format!("/mural/reply/{}", root)).await;

    let resp = app.delete("/mural/reply").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.json()["reply_target"].is_null());
}

#[tokio::test]
async fn reply_to_unknown_post_is_not_found() {
    let app = app().await;
    let resp = app
        .post_json(
            "/mural/posts",
            json!({ "display_name": "Bo", "message": "hi", "parent_id": "nope" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app.post("/mural/reply/nope").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// Editing and deleting
// ===========================================================================

#[tokio::test]
async fn author_edits_within_window() {
    let app = app().await;
    let id = app.create_post("Ana", "tpyo").await;

    let resp = app
        .patch_json(&format!("/mural/posts/{}", id), json!({ "message": "typo" }))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let view = app
        .wait_for_view(|view| find_post(view, &id).is_some_and(|p| p["edited"] == true))
        .await;
    assert_eq!(find_post(&view, &id).unwrap()["message_html"], "typo");
}

#[tokio::test]
async fn strangers_cannot_edit_or_delete() {
    let app = app().await;
    let id = app.create_post("Ana", "mine").await;
    let other = app.second_viewer().await;
    other.wait_until_visible(&id).await;

    let resp = other
        .patch_json(&format!("/mural/posts/{}", id), json!({ "message": "theirs" }))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = other.delete(&format!("/mural/posts/{}?confirm=true", id)).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert!(app.store.get(&id).is_some());
}

#[tokio::test]
async fn delete_requires_confirmation() {
    let app = app().await;
    let id = app.create_post("Ana", "keep me").await;

    let resp = app.delete(&format!("/mural/posts/{}", id)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "delete requires confirmation");
    assert!(app.store.get(&id).is_some());
}

#[tokio::test]
async fn delete_removes_the_whole_thread() {
    let app = app().await;
    let root = app.create_post("Ana", "root").await;
    let child = app.create_reply("Ana", "child", &root).await;
    app.create_reply("Ana", "grandchild", &child).await;

    let resp = app.delete(&format!("/mural/posts/{}?confirm=true", root)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    assert!(app.store.is_empty());
    app.wait_for_view(|view| view["empty"] == true).await;
}

#[tokio::test]
async fn failed_reply_delete_leaves_an_orphan() {
    let app = app().await;
    let root = app.create_post("Ana", "root").await;
    let stuck = app.create_reply("Ana", "stuck", &root).await;

    app.store.fail_writes_to(&stuck);
    let resp = app.delete(&format!("/mural/posts/{}?confirm=true", root)).await;
    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.error_message(), "failed to delete 1 of 1 replies");

    let view = app
        .wait_for_view(|view| view["total_roots"] == 1 && view["posts"][0]["id"] == stuck.as_str())
        .await;
    assert_eq!(view["posts"][0]["orphaned"], true);
}

// ===========================================================================
// Sorting and paging
// ===========================================================================

#[tokio::test]
async fn twenty_three_posts_make_three_pages() {
    let app = app().await;
    let mut ids = Vec::new();
    for i in 0..23 {
        ids.push(app.create_post("Ana", &format!("post {}", i)).await);
    }

    let view = app.wait_for_view(|view| view["total_roots"] == 23).await;
    assert_eq!(view["total_pages"], 3);
    assert_eq!(view["posts"].as_array().unwrap().len(), 10);

    let resp = app.put_json("/mural/page", json!({ "page": 3 })).await;
    assert_eq!(resp.status, StatusCode::OK);
    let view = resp.json();
    assert_eq!(view["page"], 3);
    assert_eq!(view["posts"].as_array().unwrap().len(), 3);
    assert_eq!(view["posts"][2]["id"], ids[0].as_str());

    let resp = app.put_json("/mural/page", json!({ "page": 4 })).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "page must be between 1 and 3");
}

#[tokio::test]
async fn popular_sort_puts_liked_posts_first() {
    let app = app().await;
    let liked = app.create_post("Ana", "liked").await;
    app.create_post("Ana", "newer").await;

    let resp = app
        .post_json(&format!("/mural/posts/{}/vote", liked), json!({ "kind": "like" }))
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app.put_json("/mural/sort", json!({ "sort": "popular" })).await;
    assert_eq!(resp.status, StatusCode::OK);
    let view = resp.json();
    assert_eq!(view["sort"], "popular");
    assert_eq!(view["posts"][0]["id"], liked.as_str());
}

#[tokio::test]
async fn unknown_sort_is_rejected() {
    let app = app().await;
    let resp = app.put_json("/mural/sort", json!({ "sort": "random" })).await;
    assert!(resp.status.is_client_error());
}
