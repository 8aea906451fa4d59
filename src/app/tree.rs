//! Derives the rendered thread shape from the flat post mirror.
//!
//! Roots are posts without a parent or whose parent is gone. Replies are
//! flattened under their nearest root ancestor, so exactly one level of
//! nesting is rendered however deep the chain in the data.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;

use crate::domain::post::{Post, SortOrder};

#[derive(Debug, Default)]
pub struct PostTree<'a> {
    pub roots: Vec<&'a Post>,
    /// Keyed by root id, chronological.
    pub children_by_parent: HashMap<String, Vec<&'a Post>>,
}

impl<'a> PostTree<'a> {
    pub fn replies(&self, root_id: &str) -> &[&'a Post] {
        self.children_by_parent
            .get(root_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub fn build_tree(posts: &HashMap<String, Post>) -> PostTree<'_> {
    let mut tree = PostTree::default();

    for post in posts.values() {
        match nearest_root(posts, post) {
            Some(root_id) => tree
                .children_by_parent
                .entry(root_id.to_string())
                .or_default()
                .push(post),
            None => tree.roots.push(post),
        }
    }

    for replies in tree.children_by_parent.values_mut() {
        replies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
    }
    tree
}

/// `None` when `post` renders as a root itself.
fn nearest_root<'a>(posts: &'a HashMap<String, Post>, post: &'a Post) -> Option<&'a str> {
    let mut seen = HashSet::new();
    seen.insert(post.id.as_str());
    let mut current = post;

    while let Some(parent) = current.parent_id.as_deref().and_then(|id| posts.get(id)) {
        if !seen.insert(parent.id.as_str()) {
            // reply cycle: nothing in it is a real root
            return None;
        }
        current = parent;
    }

    if current.id == post.id {
        None
    } else {
        Some(current.id.as_str())
    }
}

pub fn sort_roots(roots: &mut [&Post], order: SortOrder) {
    let recent = |a: &&Post, b: &&Post| b.created_at.cmp(&a.created_at).then(b.seq.cmp(&a.seq));
    match order {
        SortOrder::Recent => roots.sort_by(recent),
        SortOrder::Popular => roots.sort_by(|a, b| b.likes.cmp(&a.likes).then_with(|| recent(a, b))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    pub range: Range<usize>,
    pub total_pages: usize,
}

/// Slice of roots shown on `page` (1-based). A page past the end is empty
/// rather than clamped.
pub fn page_window(total_roots: usize, page: usize, page_size: usize) -> PageWindow {
    let page_size = page_size.max(1);
    let total_pages = total_roots.div_ceil(page_size).max(1);
    let start = page.saturating_sub(1).saturating_mul(page_size).min(total_roots);
    let end = start.saturating_add(page_size).min(total_roots);
    PageWindow {
        range: start..end,
        total_pages,
    }
}

/// Every post whose parent chain passes through `id`, nearest first.
pub fn descendants(posts: &HashMap<String, Post>, id: &str) -> Vec<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for post in posts.values() {
        if let Some(parent) = post.parent_id.as_deref() {
            children.entry(parent).or_default().push(post.id.as_str());
        }
    }

    let mut found = Vec::new();
    let mut seen = HashSet::from([id]);
    let mut queue = VecDeque::from([id]);
    while let Some(current) = queue.pop_front() {
        for &child in children.get(current).into_iter().flatten() {
            if seen.insert(child) {
                found.push(child.to_string());
                queue.push_back(child);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Duration, OffsetDateTime};

    fn post(id: &str, parent: Option<&str>, secs: i64, likes: i64) -> Post {
        Post {
            id: id.to_string(),
            message: format!("message {}", id),
            author_name: "Ana".to_string(),
            author_id: "anon_1".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH + Duration::seconds(secs),
            seq: secs,
            edited_at: None,
            parent_id: parent.map(str::to_string),
            likes,
            dislikes: 0,
            location: None,
            image_url: None,
            link_preview: None,
        }
    }

    fn map(posts: Vec<Post>) -> HashMap<String, Post> {
        posts.into_iter().map(|p| (p.id.clone(), p)).collect()
    }

    fn ids(posts: &[&Post]) -> Vec<String> {
        posts.iter().map(|p| p.id.clone()).collect()
    }

    #[test]
    fn replies_group_under_root_chronologically() {
        let posts = map(vec![
            post("root", None, 1, 0),
            post("late", Some("root"), 30, 0),
            post("early", Some("root"), 10, 0),
        ]);
        let tree = build_tree(&posts);
        assert_eq!(ids(&tree.roots), vec!["root"]);
        assert_eq!(ids(tree.replies("root")), vec!["early", "late"]);
    }

    #[test]
    fn nested_replies_flatten_to_nearest_root() {
        let posts = map(vec![
            post("root", None, 1, 0),
            post("reply", Some("root"), 2, 0),
            post("reply-to-reply", Some("reply"), 3, 0),
        ]);
        let tree = build_tree(&posts);
        assert_eq!(ids(tree.replies("root")), vec!["reply", "reply-to-reply"]);
        assert!(tree.replies("reply").is_empty());
    }

    #[test]
    fn orphans_are_promoted_to_roots() {
        let posts = map(vec![post("orphan", Some("gone"), 5, 0), post("root", None, 1, 0)]);
        let mut tree = build_tree(&posts);
        sort_roots(&mut tree.roots, SortOrder::Recent);
        assert_eq!(ids(&tree.roots), vec!["orphan", "root"]);
    }

    #[test]
    fn reply_cycles_do_not_hang_or_vanish() {
        let posts = map(vec![post("a", Some("b"), 1, 0), post("b", Some("a"), 2, 0)]);
        let tree = build_tree(&posts);
        assert_eq!(tree.roots.len(), 2);
    }

    #[test]
    fn identical_timestamps_fall_back_to_document_order() {
        let mut first = post("first", None, 7, 0);
        let mut second = post("second", None, 7, 0);
        first.seq = 1;
        second.seq = 2;
        let posts = map(vec![first, second]);
        let mut tree = build_tree(&posts);
        sort_roots(&mut tree.roots, SortOrder::Recent);
        assert_eq!(ids(&tree.roots), vec!["second", "first"]);
    }

    #[test]
    fn popular_sorts_by_likes_then_recency() {
        let posts = map(vec![
            post("old-hit", None, 1, 9),
            post("new", None, 3, 0),
            post("tie-old", None, 2, 4),
            post("tie-new", None, 4, 4),
        ]);
        let mut tree = build_tree(&posts);
        sort_roots(&mut tree.roots, SortOrder::Popular);
        assert_eq!(ids(&tree.roots), vec!["old-hit", "tie-new", "tie-old", "new"]);
    }

    #[test]
    fn pages_over_twenty_three_roots() {
        assert_eq!(page_window(23, 1, 10), PageWindow { range: 0..10, total_pages: 3 });
        assert_eq!(page_window(23, 3, 10), PageWindow { range: 20..23, total_pages: 3 });
        assert_eq!(page_window(23, 4, 10).range, 23..23);
        assert_eq!(page_window(0, 1, 10), PageWindow { range: 0..0, total_pages: 1 });
    }

    #[test]
    fn descendants_follow_the_whole_chain() {
        let posts = map(vec![
            post("root", None, 1, 0),
            post("a", Some("root"), 2, 0),
            post("b", Some("a"), 3, 0),
            post("other", None, 4, 0),
        ]);
        assert_eq!(descendants(&posts, "root"), vec!["a", "b"]);
        assert!(descendants(&posts, "other").is_empty());
    }
}
