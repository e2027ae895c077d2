//! External payment gateway seam.
//!
//! The gateway is called **outside** any database transaction; the saga
//! enforces a hard 30-second timeout around [`PaymentGateway::request_payment`]
//! and compensates with [`PaymentGateway::cancel_payment`] when anything
//! after a successful call fails.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Hard timeout for gateway payment requests.
pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// A payment request to the external gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    /// Merchant order reference.
    pub order_number: String,
    /// Amount to charge through the gateway (minor units).
    pub amount: i64,
    /// Gateway provider (e.g. `TOSS`).
    pub provider: String,
    /// Gateway-side method (e.g. `CARD`).
    pub method: String,
    /// Masked card number for display, when paying by card.
    pub card_number_masked: Option<String>,
    /// Idempotency key: retries of the same request must reuse it.
    pub idempotency_key: Uuid,
}

/// Gateway response to a payment request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    /// Whether the charge was approved.
    pub success: bool,
    /// Gateway transaction id, present on success.
    pub transaction_id: Option<String>,
    /// Gateway error code, present on decline.
    pub error_code: Option<String>,
}

/// Gateway response to a cancellation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCancelResponse {
    /// Whether the cancellation was accepted.
    pub success: bool,
}

/// External payment gateway client.
pub trait PaymentGateway: Send + Sync {
    /// Request a charge. Network/protocol failures surface as
    /// [`CommerceError::GatewayFailed`](crate::error::CommerceError);
    /// declines come back as `success == false`.
    fn request_payment(
        &self,
        request: &GatewayRequest,
    ) -> impl Future<Output = Result<GatewayResponse>> + Send;

    /// Cancel a previously approved charge (compensation).
    fn cancel_payment(
        &self,
        transaction_id: &str,
    ) -> impl Future<Output = Result<GatewayCancelResponse>> + Send;
}
