//! Explicit PostgreSQL provisioning for tests.
//!
//! The server is taken from `TEST_DATABASE_URL` only; `DATABASE_URL` is never
//! read, so a deployment target cannot be migrated by accident.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use migrator_core::error::{MigrateError, Result};

/// Connection to the test server's maintenance database.
pub struct TestDatabase {
    pool: PgPool,
    url: String,
}

impl TestDatabase {
    /// Connect to database at the given URL.
    pub async fn from_url(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .map_err(|e| MigrateError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Connect using TEST_DATABASE_URL environment variable.
    pub async fn from_env() -> Result<Self> {
        let url = std::env::var("TEST_DATABASE_URL").map_err(|_| {
            MigrateError::Configuration(
                "TEST_DATABASE_URL not set. Set it explicitly for database tests.".to_string(),
            )
        })?;
        Self::from_url(&url).await
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Create a fresh, empty database for a single test.
    pub async fn isolated(&self, test_name: &str) -> Result<IsolatedTestDb> {
        // UUID suffix prevents collisions when tests run in parallel
        let db_name = format!(
            "migrator_test_{}_{}",
            sanitize_db_name(test_name),
            uuid::Uuid::new_v4().simple()
        );

        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::Connection(e.to_string()))?;

        let url = replace_db_name(&self.url, &db_name);
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .map_err(|e| MigrateError::Connection(e.to_string()))?;

        Ok(IsolatedTestDb {
            pool,
            url,
            db_name,
            admin: self.pool.clone(),
        })
    }
}

/// A database that exists for the lifetime of a single test.
pub struct IsolatedTestDb {
    pool: PgPool,
    url: String,
    db_name: String,
    admin: PgPool,
}

impl IsolatedTestDb {
    /// Pool for inspecting the database after a run.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// URL to hand to the runner.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Drop the database.
    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;

        let _ = sqlx::query(&format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}'",
            self.db_name
        ))
        .execute(&self.admin)
        .await;

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
            .execute(&self.admin)
            .await
            .map_err(|e| MigrateError::Connection(e.to_string()))?;

        Ok(())
    }
}

/// Sanitize a test name for use in a database name.
fn sanitize_db_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .take(32)
        .collect()
}

/// Replace the database name in a connection URL.
fn replace_db_name(url: &str, new_db: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return format!("{}/{}", url, new_db);
    };
    let (query_start, query) = match url.find('?') {
        Some(idx) => (idx, &url[idx..]),
        None => (url.len(), ""),
    };
    let authority_and_path = &url[scheme_end + 3..query_start];

    match authority_and_path.find('/') {
        Some(slash) => format!(
            "{}{}{}",
            &url[..scheme_end + 3 + slash + 1],
            new_db,
            query
        ),
        None => format!("{}/{}{}", &url[..query_start], new_db, query),
    }
}
