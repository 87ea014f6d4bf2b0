use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_pool(database_url: &str) -> DbPool {
    create_pool_with_size(database_url, 10)
}

/// Build a pool with an explicit connection cap. Stock mutations hold a row
/// lock for the duration of their transaction, so the pool size bounds how
/// many requests can contend for the same product at once.
pub fn create_pool_with_size(database_url: &str, max_size: u32) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .build(manager)
        .expect("Failed to create database connection pool")
}
