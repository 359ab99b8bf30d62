//! Explicit database provisioning for tests.
//!
//! Database tests read `TEST_DATABASE_URL` and never fall back to
//! `DATABASE_URL`, so a developer's `.env` cannot point a test run at a
//! real database. Tests that need Postgres call [`TestDatabase::try_from_env`]
//! and skip themselves when it returns `None`.

use sqlx::PgPool;

use crate::error::{Result, ShiftError};

/// Environment variable holding the test server URL.
pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

/// Connection to the server that hosts per-test databases.
pub struct TestDatabase {
    pool: PgPool,
    url: String,
}

impl TestDatabase {
    /// Connect to database at the given URL.
    pub async fn from_url(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .map_err(|e| ShiftError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Connect using TEST_DATABASE_URL, or `None` when it is not set.
    pub async fn try_from_env() -> Result<Option<Self>> {
        match std::env::var(TEST_DATABASE_URL) {
            Ok(url) if !url.is_empty() => Self::from_url(&url).await.map(Some),
            _ => Ok(None),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Creates a dedicated database for a single test, providing full isolation.
    pub async fn isolated(&self, test_name: &str) -> Result<IsolatedTestDb> {
        // UUID suffix prevents collisions when tests run in parallel
        let db_name = format!(
            "shift_test_{}_{}",
            sanitize_db_name(test_name),
            uuid::Uuid::new_v4().simple()
        );

        // Double-quoted identifier handles special characters in generated name
        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
            .execute(&self.pool)
            .await?;

        let url = replace_db_name(&self.url, &db_name);

        Ok(IsolatedTestDb {
            url,
            db_name,
            admin: self.pool.clone(),
        })
    }
}

/// A database that exists for the lifetime of a single test.
pub struct IsolatedTestDb {
    url: String,
    db_name: String,
    admin: PgPool,
}

impl IsolatedTestDb {
    /// Connection URL of the isolated database.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Drop the database, terminating any connection still attached to it.
    pub async fn cleanup(self) -> Result<()> {
        let _ = sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1",
        )
        .bind(&self.db_name)
        .execute(&self.admin)
        .await;

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
            .execute(&self.admin)
            .await?;

        Ok(())
    }
}

/// Sanitize a test name for use in a database name.
fn sanitize_db_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(24)
        .collect()
}

/// Replace the database name in a connection URL.
fn replace_db_name(url: &str, new_db: &str) -> String {
    // Handle both postgres://.../ and postgres://...? formats
    if let Some(idx) = url.rfind('/') {
        let base = &url[..=idx];
        if let Some(query_idx) = url[idx + 1..].find('?') {
            let query = &url[idx + 1 + query_idx..];
            format!("{}{}{}", base, new_db, query)
        } else {
            format!("{}{}", base, new_db)
        }
    } else {
        format!("{}/{}", url, new_db)
    }
}
