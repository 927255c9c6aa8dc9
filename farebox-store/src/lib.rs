pub mod app_config;
pub mod events;
pub mod memory;
pub mod postgres;
pub mod redis_repo;

pub use events::{EventProducer, LogDispatcher};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use redis_repo::RedisClient;
