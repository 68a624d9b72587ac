//! Database module
//!
//! Pool construction and schema checks for the Postgres-backed stores.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::domain::StoreKind;

/// Tables each store flavour must provide
pub fn required_tables(kind: StoreKind) -> &'static [&'static str] {
    match kind {
        StoreKind::Relational => &["users", "accounts"],
        StoreKind::Document => &["user_documents", "accounts"],
    }
}

/// Open a pool and verify connectivity
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;

    verify_connection(&pool).await?;
    Ok(pool)
}

/// Pool that connects on first use; startup does not fail if the store is down
pub fn connect_lazy(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect_lazy(url)
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool, kind: StoreKind) -> Result<bool, sqlx::Error> {
    for table in required_tables(kind) {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!(store = %kind, "Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
