pub mod applications;
pub mod config;
pub mod database;
pub mod pool;
pub mod repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use pool::{ConnectionPool, PooledConnection};
pub use repository::Repository;
