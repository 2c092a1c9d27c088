// HTTP contract checks against the assembled router

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use resale_exchange::auth::Role;
use resale_exchange::router::build_router;
use resale_exchange::AppState;

struct TestApp {
    state: AppState,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let (state, _) = common::test_state();
        let router = build_router(state.clone());
        Self { state, router }
    }

    fn token(&self, user_id: i64, role: Role) -> String {
        self.state
            .jwt_service
            .issue_token(user_id, &format!("user{}", user_id), role)
            .expect("token issued")
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }
}

#[tokio::test]
async fn test_bid_routes_require_a_token() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/v1/bids/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_1001");

    let (status, _) = app
        .call(Method::GET, "/v1/bids/me", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_bid_then_match() {
    let app = TestApp::new();
    let seller = app.token(2, Role::User);
    let buyer = app.token(1, Role::User);

    let (status, created) = app
        .call(
            Method::POST,
            "/v1/bids",
            Some(&seller),
            Some(json!({"productOptionId": 3, "price": 210000, "type": "SELL"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "PENDING");
    assert!(created.get("tradeId").is_none());

    let (status, matched) = app
        .call(
            Method::POST,
            "/v1/bids",
            Some(&buyer),
            Some(json!({"productOptionId": 3, "price": 220000, "type": "BUY"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(matched["status"], "MATCHED");
    let trade_id = matched["tradeId"].as_i64().unwrap();

    let (status, trade) = app
        .call(Method::GET, &format!("/v1/trades/{}", trade_id), Some(&buyer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trade["price"], 210000);
    assert_eq!(trade["role"], "BUYER");
    assert_eq!(trade["status"], "WAITING_PAYMENT");

    let outsider = app.token(7, Role::User);
    let (status, _) = app
        .call(Method::GET, &format!("/v1/trades/{}", trade_id), Some(&outsider), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_bids_are_rejected() {
    let app = TestApp::new();
    let token = app.token(1, Role::User);

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/bids",
            Some(&token),
            Some(json!({"productOptionId": 3, "price": 0, "type": "BUY"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BID_3101");

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/bids",
            Some(&token),
            Some(json!({"productOptionId": 999, "price": 1000, "type": "BUY"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "BID_3102");
}

#[tokio::test]
async fn test_list_envelope_shape() {
    let app = TestApp::new();
    let token = app.token(5, Role::User);
    for price in [100_000, 101_000, 102_000] {
        let (status, _) = app
            .call(
                Method::POST,
                "/v1/bids",
                Some(&token),
                Some(json!({"productOptionId": 3, "price": price, "type": "BUY"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = app
        .call(Method::GET, "/v1/bids/me?page=0&size=2", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["paging"]["currentPage"], 0);
    assert_eq!(page["paging"]["totalElements"], 3);
    assert_eq!(page["paging"]["hasNext"], true);

    let (status, depth) = app
        .call(Method::GET, "/v1/bids?productOptionId=3", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    // best buy first
    assert_eq!(depth["items"][0]["price"], 102000);
    assert_eq!(depth["paging"]["hasNext"], false);
}

#[tokio::test]
async fn test_admin_routes_need_admin_role() {
    let app = TestApp::new();
    let user = app.token(1, Role::User);
    let admin = app.token(99, Role::Admin);

    let (status, body) = app.call(Method::GET, "/v1/admin/bids", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "AUTHZ_2001");

    let (status, page) = app
        .call(Method::GET, "/v1/admin/bids?status=PENDING", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(page["paging"].is_object());

    let (status, body) = app
        .call(Method::GET, "/v1/admin/bids?status=BOGUS", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_object());
}

#[tokio::test]
async fn test_admin_force_cancel_over_http() {
    let app = TestApp::new();
    let owner = app.token(4, Role::User);
    let admin = app.token(99, Role::Admin);

    let (_, created) = app
        .call(
            Method::POST,
            "/v1/bids",
            Some(&owner),
            Some(json!({"productOptionId": 3, "price": 150000, "type": "SELL"})),
        )
        .await;
    let bid_id = created["id"].as_i64().unwrap();

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/v1/admin/bids/{}", bid_id),
            Some(&admin),
            Some(json!({"reasonCode": "NOT_A_REASON", "comment": "x"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "ADM_3201");

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/v1/admin/bids/{}", bid_id),
            Some(&admin),
            Some(json!({"reasonCode": "OUT_OF_STOCK", "comment": "seller confirmed"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");
    assert_eq!(body["cancelledBy"], 99);

    let (status, audit) = app
        .call(Method::GET, "/v1/admin/audit?eventType=bid_force_cancelled", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(audit["count"], 1);
}

#[tokio::test]
async fn test_notifications_and_read_receipts() {
    let app = TestApp::new();
    let token = app.token(8, Role::User);
    app.call(
        Method::POST,
        "/v1/bids",
        Some(&token),
        Some(json!({"productOptionId": 3, "price": 50000, "type": "BUY"})),
    )
    .await;

    let (status, unread) = app
        .call(Method::GET, "/v1/notification/unread-count", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unread["unreadCount"], 1);

    let (_, page) = app
        .call(Method::GET, "/v1/notification", Some(&token), None)
        .await;
    let id = page["items"][0]["id"].as_i64().unwrap();

    let other = app.token(9, Role::User);
    let (status, _) = app
        .call(Method::PATCH, &format!("/v1/notification/{}/read", id), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, read) = app
        .call(Method::PATCH, &format!("/v1/notification/{}/read", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(read["readAt"].is_string());

    let (_, cursor) = app
        .call(Method::GET, "/v1/notification?afterId=0", Some(&token), None)
        .await;
    assert_eq!(cursor["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    // no recorder installed in tests
    let (status, _) = app.call(Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
