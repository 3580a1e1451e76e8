//! Testing utilities.
//!
//! [`MockDriver`] stands in for a database in unit tests. [`TestDatabase`]
//! provisions isolated PostgreSQL databases for integration tests when
//! `TEST_DATABASE_URL` is set.

mod db;
mod mock;

pub use db::{IsolatedTestDb, TestDatabase};
pub use mock::MockDriver;
