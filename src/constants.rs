//! Application constants.
//!
//! Values here are fixed by the HTTP contract or too minor to be configurable.

/// API Version constants
pub mod api {
    /// Current API version, also the route prefix
    pub const VERSION: &str = "v1";
}

/// Pagination defaults shared by list endpoints
pub mod pagination {
    /// First page index (pages are zero-based)
    pub const DEFAULT_PAGE: u32 = 0;

    pub const DEFAULT_PAGE_SIZE: u32 = 10;

    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Upper bound for cursor-mode notification reads
    pub const MAX_CURSOR_LIMIT: usize = 100;
}

/// Audit log query bounds
pub mod audit {
    pub const DEFAULT_LIMIT: usize = 50;

    pub const MAX_LIMIT: usize = 500;
}

/// Background maintenance cadence
pub mod maintenance {
    /// How often idle rate-limit buckets and unused trade locks are dropped
    pub const PRUNE_INTERVAL_SECS: u64 = 300;

    /// A bucket untouched for this long is dropped once full
    pub const RATE_BUCKET_IDLE_SECS: u64 = 600;
}

/// Request header names
pub mod headers {
    pub const REQUEST_ID: &str = "x-request-id";
}
