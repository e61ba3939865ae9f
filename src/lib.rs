use std::sync::Arc;

use config::Config;
use redis::Client as RedisClient;
use sqlx::PgPool;
use storage::BlobStore;

pub mod config;
pub mod error;
pub mod middleware;
pub mod storage;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub blobs: Arc<BlobStore>,
}
