pub mod cache;
pub mod clock;
pub mod db;
pub mod fetch;
pub mod geo;
pub mod memory_store;
pub mod pg_store;
pub mod prefs;
pub mod store;
