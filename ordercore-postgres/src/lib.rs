//! PostgreSQL storage adapters for the `OrderCore` order engine.
//!
//! Implements every storage port from `ordercore` against a `sqlx`
//! connection pool. The two consistency-critical pieces live here:
//!
//! - `reserve` is one conditional
//!   `UPDATE items SET stock = stock - $q WHERE id = $id AND stock >= $q`,
//!   so the check and the decrement are a single atomic statement no
//!   concurrent request can interleave;
//! - `insert` writes the order, its delivery columns, and its lines in one
//!   transaction.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod store;

use std::num::NonZeroU32;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{query, Pool, Postgres};
use thiserror::Error;

/// Errors raised while setting up the adapter itself.
///
/// Runtime port failures are reported through `ordercore::StoreError`.
#[derive(Debug, Error)]
pub enum PostgresStoreError {
    /// The connection pool could not be created.
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),

    /// The schema bootstrap failed.
    #[error("failed to initialize postgres schema")]
    SchemaFailed(#[source] sqlx::Error),
}

/// Maximum number of database connections in the pool.
///
/// `NonZeroU32` makes an empty pool unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxConnections(NonZeroU32);

impl MaxConnections {
    /// Wrap a pool size.
    pub const fn new(value: NonZeroU32) -> Self {
        Self(value)
    }

    /// The underlying pool size.
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

/// Configuration for the adapter's connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10).
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30s).
    pub acquire_timeout: Duration,
    /// Idle timeout for pooled connections (default: 10 minutes).
    pub idle_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: NonZeroU32 = match NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// PostgreSQL-backed implementation of all `ordercore` storage ports.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect with the default configuration.
    pub async fn new<S: Into<String>>(connection_string: S) -> Result<Self, PostgresStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Connect with a custom configuration.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresStoreError> {
        let connection_string = connection_string.into();
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.get())
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&connection_string)
            .await
            .map_err(PostgresStoreError::ConnectionFailed)?;
        Ok(Self { pool })
    }

    /// Wrap an existing connection pool.
    ///
    /// Use this when the pool is shared across components.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub const fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Verify the database answers.
    pub async fn ping(&self) -> Result<(), PostgresStoreError> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PostgresStoreError::ConnectionFailed)?;
        Ok(())
    }

    /// Create the schema if it does not exist yet.
    pub async fn initialize(&self) -> Result<(), PostgresStoreError> {
        for statement in store::SCHEMA {
            query(statement)
                .execute(&self.pool)
                .await
                .map_err(PostgresStoreError::SchemaFailed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = PostgresConfig::default();
        assert_eq!(config.max_connections.get(), 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
    }

    #[test]
    fn max_connections_is_never_zero() {
        let five = MaxConnections::new(NonZeroU32::new(5).expect("5 is non-zero"));
        assert_eq!(five.get(), 5);
        // Zero is rejected by the type system: NonZeroU32::new(0) is None.
        assert!(NonZeroU32::new(0).is_none());
    }
}
