// PortOne client against a stubbed provider

use std::time::Duration;

use resale_exchange::services::payment::gateway::{GatewayError, PaymentGateway, ProviderPaymentStatus};
use resale_exchange::services::PortOneClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> PortOneClient {
    PortOneClient::new(server.uri(), "test-secret", "store-1", Duration::from_secs(2))
        .expect("client builds")
}

#[tokio::test]
async fn test_fetch_payment_reads_status_and_total() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payments/PAY-1-7"))
        .and(query_param("storeId", "store-1"))
        .and(header("authorization", "PortOne test-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "PAID",
            "amount": {"total": 120000, "paid": 120000}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payment = client(&server).fetch_payment("PAY-1-7").await.unwrap();
    assert_eq!(payment.status, ProviderPaymentStatus::Paid);
    assert_eq!(payment.amount, 120000);
    assert_eq!(payment.merchant_uid, "PAY-1-7");
}

#[tokio::test]
async fn test_unknown_payment_is_rejected_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payments/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("PAYMENT_NOT_FOUND"))
        .mount(&server)
        .await;

    let err = client(&server).fetch_payment("missing").await.unwrap_err();
    match &err {
        GatewayError::Rejected { status, message } => {
            assert_eq!(*status, 404);
            assert!(message.contains("PAYMENT_NOT_FOUND"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_errors_are_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payments/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).fetch_payment("flaky").await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_cancel_sends_amount_and_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments/PAY-1-9/cancel"))
        .and(header("authorization", "PortOne test-secret"))
        .and(body_partial_json(json!({
            "storeId": "store-1",
            "amount": 50000,
            "reason": "item damaged"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cancellation": {}})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .cancel_payment("PAY-1-9", 50000, "item damaged")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancel_of_cancelled_payment_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payments/PAY-2-3/cancel"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({"type": "PAYMENT_ALREADY_CANCELLED"})),
        )
        .mount(&server)
        .await;

    assert!(client(&server)
        .cancel_payment("PAY-2-3", 1000, "duplicate")
        .await
        .is_ok());
}

#[tokio::test]
async fn test_slow_provider_times_out_as_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payments/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = PortOneClient::new(server.uri(), "s", "store-1", Duration::from_millis(50)).unwrap();
    let err = client.fetch_payment("slow").await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(ref m) if m.contains("timed out")));
}
