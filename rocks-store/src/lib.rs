pub mod app_config;
pub mod database;
pub mod gateways;
pub mod memory;
pub mod redis_repo;

pub use app_config::Config;
pub use database::PgStore;
pub use gateways::{PayPalGateway, StripeGateway};
pub use memory::MemoryStore;
pub use redis_repo::RedisStore;
