pub mod attachments;
pub mod engine;
pub mod identity;
pub mod permissions;
pub mod preview;
pub mod render;
pub mod tree;
