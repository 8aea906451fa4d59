pub mod error;
pub mod moderation;
pub mod post;
pub mod vote;
