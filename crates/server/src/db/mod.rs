pub mod pool;

pub use pool::{check_pool_health, create_pg_pool, max_connections_from_env};
