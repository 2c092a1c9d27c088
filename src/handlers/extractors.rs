//! Common extractors for API handlers.
//!
//! Body and query rejections are turned into `ApiError` so malformed input gets
//! the same JSON error envelope as every other failure.

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

/// JSON body that has passed its `validator` rules
///
/// # Example
/// ```ignore
/// async fn create(ValidatedJson(req): ValidatedJson<BidRequest>) -> Result<...> { ... }
/// ```
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Query string with API-shaped rejections
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::models::bid::BidRequest;
    use axum::body::Body;

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_body_passes() {
        let req = json_request(r#"{"productOptionId":3,"price":1000,"type":"BUY"}"#);
        let ValidatedJson(body) = ValidatedJson::<BidRequest>::from_request(req, &())
            .await
            .unwrap();
        assert_eq!(body.product_option_id, 3);
    }

    #[tokio::test]
    async fn test_rule_violation_names_field() {
        let req = json_request(r#"{"productOptionId":0,"price":1000,"type":"BUY"}"#);
        let err = ValidatedJson::<BidRequest>::from_request(req, &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.error_code(), ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_syntax_error_is_invalid_format() {
        let req = json_request("{not json");
        let err = ValidatedJson::<BidRequest>::from_request(req, &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.error_code(), ErrorCode::InvalidFormat);
    }
}
