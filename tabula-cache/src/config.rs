//! Configuration for the materialization cache.

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix for allocated guids.
    pub guid_prefix: String,
    /// Prefix for materialized temp-table names.
    pub table_prefix: String,
    /// Whether a failed page/aggregate read forces one rebuild-and-retry
    /// before the failure is surfaced.
    pub rebuild_on_read_failure: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            guid_prefix: "guid_".to_string(),
            table_prefix: "tmpt_".to_string(),
            rebuild_on_read_failure: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the guid prefix.
    pub fn with_guid_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.guid_prefix = prefix.into();
        self
    }

    /// Set the temp-table name prefix.
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Enable or disable the one-shot rebuild on read failure.
    pub fn with_rebuild_on_read_failure(mut self, enabled: bool) -> Self {
        self.rebuild_on_read_failure = enabled;
        self
    }
}
