pub mod app_config;
pub mod database;
pub mod redis_repo;

pub use database::{DbClient, PostgresTripStore};
pub use redis_repo::RedisTripStore;
