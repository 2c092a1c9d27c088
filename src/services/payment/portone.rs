//! PortOne REST client (V2 payments API)

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::gateway::{GatewayError, PaymentGateway, ProviderPayment, ProviderPaymentStatus};

#[derive(Debug, Deserialize)]
struct PaymentBody {
    status: String,
    amount: AmountBody,
}

#[derive(Debug, Deserialize)]
struct AmountBody {
    total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelBody<'a> {
    store_id: &'a str,
    amount: i64,
    reason: &'a str,
    current_cancellable_amount: i64,
}

#[derive(Clone)]
pub struct PortOneClient {
    client: Client,
    base_url: String,
    api_secret: String,
    store_id: String,
}

impl PortOneClient {
    pub fn new(
        base_url: impl Into<String>,
        api_secret: impl Into<String>,
        store_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_secret: api_secret.into(),
            store_id: store_id.into(),
        })
    }

    fn authorization(&self) -> String {
        format!("PortOne {}", self.api_secret)
    }

    fn payment_url(&self, merchant_uid: &str) -> String {
        format!("{}/payments/{}", self.base_url, merchant_uid)
    }

    async fn check_status(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("").to_string());
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Transport(format!("request timed out: {}", err))
    } else {
        GatewayError::Transport(err.to_string())
    }
}

#[async_trait]
impl PaymentGateway for PortOneClient {
    fn name(&self) -> &'static str {
        "portone"
    }

    async fn fetch_payment(&self, merchant_uid: &str) -> Result<ProviderPayment, GatewayError> {
        debug!(merchant_uid = %merchant_uid, "Fetching payment from PortOne");

        let response = self
            .client
            .get(self.payment_url(merchant_uid))
            .query(&[("storeId", self.store_id.as_str())])
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check_status(response).await?;

        let body: PaymentBody = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        Ok(ProviderPayment {
            merchant_uid: merchant_uid.to_string(),
            status: ProviderPaymentStatus::parse(&body.status),
            amount: body.amount.total,
        })
    }

    async fn cancel_payment(
        &self,
        merchant_uid: &str,
        amount: i64,
        reason: &str,
    ) -> Result<(), GatewayError> {
        let body = CancelBody {
            store_id: &self.store_id,
            amount,
            reason,
            current_cancellable_amount: amount,
        };

        let response = self
            .client
            .post(format!("{}/cancel", self.payment_url(merchant_uid)))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        match Self::check_status(response).await {
            Ok(_) => {
                info!(merchant_uid = %merchant_uid, amount = amount, "PortOne payment cancelled");
                Ok(())
            }
            // already cancelled on the provider side
            Err(GatewayError::Rejected { status, message })
                if status == StatusCode::CONFLICT.as_u16()
                    && message.contains("ALREADY_CANCELLED") =>
            {
                info!(merchant_uid = %merchant_uid, "PortOne payment was already cancelled");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
