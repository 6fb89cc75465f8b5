use std::time::Duration;

/// Worker count used when the caller asks for zero or fewer workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Upper bound on import workers, whatever the caller asks for.
pub const MAX_WORKERS: usize = 64;

/// Runtime settings for the ledger service.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Workers used by bulk import when the caller passes a non-positive count
    pub default_workers: usize,
    /// Upper bound on a whole bulk import
    pub import_timeout: Option<Duration>,
    /// Upper bound on a whole report computation
    pub report_timeout: Option<Duration>,
    /// How often report aggregation logs progress while waiting
    pub progress_interval: Duration,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    /// Hold a per-category lock across read-compare-insert.
    /// Off by default, which keeps the check-then-act race.
    pub serialize_category_writes: bool,
    pub max_connections: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_workers: DEFAULT_WORKERS,
            import_timeout: None,
            report_timeout: None,
            progress_interval: Duration::from_millis(400),
            cache_enabled: true,
            cache_ttl: Duration::from_secs(30),
            serialize_category_writes: false,
            max_connections: 10,
        }
    }
}

impl LedgerConfig {
    pub fn with_serialized_writes(mut self) -> Self {
        self.serialize_category_writes = true;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }
}
