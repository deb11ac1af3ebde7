//! Entity store configuration.

/// Configuration for an [`EntityStore`](crate::EntityStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How many entities a lookup fetches concurrently.
    pub find_concurrency: usize,

    /// Row limit passed to every index scan (`None` = store default).
    pub scan_limit: Option<usize>,

    /// Whether collection updates reject buckets that don't exist yet.
    pub strict_update: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            find_concurrency: 8,
            scan_limit: None,
            strict_update: false,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many entities a lookup fetches concurrently (at least 1).
    #[must_use]
    pub fn find_concurrency(mut self, value: usize) -> Self {
        self.find_concurrency = value.max(1);
        self
    }

    /// Sets the row limit passed to index scans.
    #[must_use]
    pub fn scan_limit(mut self, limit: Option<usize>) -> Self {
        self.scan_limit = limit;
        self
    }

    /// Sets whether collection updates reject missing buckets.
    #[must_use]
    pub const fn strict_update(mut self, value: bool) -> Self {
        self.strict_update = value;
        self
    }
}
