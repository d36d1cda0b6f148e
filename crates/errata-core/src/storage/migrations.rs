//! Database migrations
//!
//! This module manages SQLite schema migrations for errata.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Error code catalog
///
/// The UNIQUE index on `code` is the authoritative defense against two
/// concurrent writers registering the same code; the service-level duplicate
/// check is only a pre-check.
const MIGRATION_V1: &str = r#"
    -- Error code catalog
    CREATE TABLE IF NOT EXISTS error_codes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code INTEGER NOT NULL,
        application_name TEXT NOT NULL,
        message TEXT NOT NULL DEFAULT '',
        type TEXT NOT NULL DEFAULT 'manual' CHECK (type IN ('manual', 'auto_generated')),
        create_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        update_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_error_codes_code ON error_codes(code);
    CREATE INDEX IF NOT EXISTS idx_error_codes_application_name ON error_codes(application_name);
    CREATE INDEX IF NOT EXISTS idx_error_codes_update_time ON error_codes(update_time);
"#;

/// Get the current schema version recorded in the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::query(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Record a migration as applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    // Apply migrations in order
    if current_version < 1 {
        tracing::info!("Applying migration v1: Error code catalog");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.expect("Failed to run migrations");

        let status = migration_status(&pool)
            .await
            .expect("Failed to get migration status");
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);

        // The catalog table exists and is empty
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM error_codes")
            .fetch_one(&pool)
            .await
            .expect("error_codes table missing");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.expect("First run failed");
        run_migrations(&pool).await.expect("Second run failed");

        let status = migration_status(&pool)
            .await
            .expect("Failed to get migration status");
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_needs_migration_on_fresh_database() {
        let pool = create_test_pool().await;

        assert!(needs_migration(&pool).await.expect("Check failed"));
        run_migrations(&pool).await.expect("Failed to run migrations");
        assert!(!needs_migration(&pool).await.expect("Check failed"));
    }

    #[tokio::test]
    async fn test_code_unique_index() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.expect("Failed to run migrations");

        sqlx::query("INSERT INTO error_codes (code, application_name) VALUES (1001, 'billing')")
            .execute(&pool)
            .await
            .expect("First insert failed");

        let duplicate =
            sqlx::query("INSERT INTO error_codes (code, application_name) VALUES (1001, 'orders')")
                .execute(&pool)
                .await;
        assert!(duplicate.is_err());
    }
}
