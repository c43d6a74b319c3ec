//! Shared test utilities for database-backed services

use sqlx::SqlitePool;

use super::Database;

/// In-memory pool with the full schema applied
pub async fn test_pool() -> SqlitePool {
    let db = Database::new(None)
        .await
        .expect("Failed to create test database");
    db.pool().clone()
}
