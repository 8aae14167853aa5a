//! Database configuration.

use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database already exists.
    pub error_if_exists: bool,

    /// Whether to sync the WAL on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// How long a read-write transaction waits for the writer lock.
    pub lock_timeout: Duration,

    /// How many times a conflicting schema id allocation is retried.
    pub registry_retry_limit: u32,

    /// Number of compiled query plans kept per repository (0 disables caching).
    pub plan_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            sync_on_commit: true,
            lock_timeout: Duration::from_secs(5),
            registry_retry_limit: 8,
            plan_cache_capacity: 256,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if database exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets whether to sync WAL on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the writer lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the schema allocation retry limit.
    #[must_use]
    pub const fn registry_retry_limit(mut self, limit: u32) -> Self {
        self.registry_retry_limit = limit;
        self
    }

    /// Sets the query plan cache capacity.
    #[must_use]
    pub const fn plan_cache_capacity(mut self, capacity: usize) -> Self {
        self.plan_cache_capacity = capacity;
        self
    }
}
