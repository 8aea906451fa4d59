use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    Like,
    Dislike,
}

impl VoteKind {
    fn deltas(&self, amount: i64) -> (i64, i64) {
        match self {
            Self::Like => (amount, 0),
            Self::Dislike => (0, amount),
        }
    }
}

/// Result of pressing a vote button given the vote already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    pub next: Option<VoteKind>,
    pub likes_delta: i64,
    pub dislikes_delta: i64,
}

impl VoteTransition {
    /// Same kind clears, opposite kind swaps, no vote sets.
    pub fn apply(current: Option<VoteKind>, pressed: VoteKind) -> Self {
        match current {
            Some(active) if active == pressed => {
                let (likes_delta, dislikes_delta) = pressed.deltas(-1);
                Self {
                    next: None,
                    likes_delta,
                    dislikes_delta,
                }
            }
            Some(active) => {
                let (old_likes, old_dislikes) = active.deltas(-1);
                let (new_likes, new_dislikes) = pressed.deltas(1);
                Self {
                    next: Some(pressed),
                    likes_delta: old_likes + new_likes,
                    dislikes_delta: old_dislikes + new_dislikes,
                }
            }
            None => {
                let (likes_delta, dislikes_delta) = pressed.deltas(1);
                Self {
                    next: Some(pressed),
                    likes_delta,
                    dislikes_delta,
                }
            }
        }
    }
}
