pub mod admin;
pub mod bids;
pub mod extractors;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod payments;
pub mod queries;
pub mod response;
pub mod settlements;
pub mod trades;

// Re-export commonly used types
pub use extractors::{ApiQuery, ValidatedJson};
pub use queries::PaginationParams;
pub use response::{Created, ListResponse, Paged, PagingInfo};
