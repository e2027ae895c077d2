//! HTTP client for the external payment gateway.

use reqwest::Client;
use storefront_core::error::{CommerceError, Result};
use storefront_core::gateway::{
    GatewayCancelResponse, GatewayRequest, GatewayResponse, PaymentGateway,
};

/// Gateway adapter speaking JSON over HTTP.
///
/// The saga wraps every call in its own hard timeout; the client timeout
/// here only bounds the connection setup.
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
}

impl HttpPaymentGateway {
    /// Create the adapter.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

impl PaymentGateway for HttpPaymentGateway {
    async fn request_payment(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
        let url = format!("{}/api/payments", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", request.idempotency_key.to_string())
            .json(request)
            .send()
            .await
            .map_err(|e| CommerceError::GatewayFailed {
                reason: format!("transport: {e}"),
            })?;

        response
            .json::<GatewayResponse>()
            .await
            .map_err(|e| CommerceError::GatewayFailed {
                reason: format!("malformed response: {e}"),
            })
    }

    async fn cancel_payment(&self, transaction_id: &str) -> Result<GatewayCancelResponse> {
        let url = format!("{}/api/payments/{transaction_id}/cancel", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| CommerceError::GatewayFailed {
                reason: format!("transport: {e}"),
            })?;

        response
            .json::<GatewayCancelResponse>()
            .await
            .map_err(|e| CommerceError::GatewayFailed {
                reason: format!("malformed response: {e}"),
            })
    }
}
