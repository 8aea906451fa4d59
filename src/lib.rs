pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::sync::Arc;

use crate::app::engine::MuralEngine;
use crate::infra::{cache::RedisCache, db::Db};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MuralEngine>,
    /// Present with the Postgres backend.
    pub db: Option<Db>,
    pub cache: Option<RedisCache>,
}
