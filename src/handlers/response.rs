//! Common response types and helpers for API handlers.
//!
//! Every list endpoint answers with the same `{items, paging}` envelope so
//! clients can page through bids, trades, settlements and notifications alike.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::database::PagedResult;

/// Paging block of the list envelope
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PagingInfo {
    /// Zero-based page index
    pub current_page: u32,
    pub total_elements: u64,
    pub has_next: bool,
}

/// Paginated response wrapper
#[derive(Debug, Serialize, ToSchema)]
pub struct Paged<T: Serialize> {
    pub items: Vec<T>,
    pub paging: PagingInfo,
}

impl<T: Serialize> From<PagedResult<T>> for Paged<T> {
    fn from(result: PagedResult<T>) -> Self {
        let paging = PagingInfo {
            current_page: result.page,
            total_elements: result.total,
            has_next: result.has_next_page(),
        };
        Self {
            items: result.items,
            paging,
        }
    }
}

impl<T: Serialize> Paged<T> {
    /// Whole result set as the only page
    pub fn single(items: Vec<T>) -> Self {
        let paging = PagingInfo {
            current_page: 0,
            total_elements: items.len() as u64,
            has_next: false,
        };
        Self { items, paging }
    }
}

/// Response helper for created resources
pub struct Created<T>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self.0)).into_response()
    }
}

/// Simple list response without pagination
#[derive(Debug, Serialize, ToSchema)]
pub struct ListResponse<T: Serialize> {
    pub items: Vec<T>,
    pub count: usize,
}

impl<T: Serialize> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        let count = items.len();
        Self { items, count }
    }
}
