//! Scripted payment gateway mock.
//!
//! Records every request and cancellation; responses come from a FIFO
//! script, falling back to approval with a generated transaction id.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use storefront_core::error::{CommerceError, Result};
use storefront_core::gateway::{
    GatewayCancelResponse, GatewayRequest, GatewayResponse, PaymentGateway,
};

#[derive(Default)]
struct GatewayInner {
    script: VecDeque<Result<GatewayResponse>>,
    requests: Vec<GatewayRequest>,
    cancels: Vec<String>,
    txn_seq: u64,
}

/// Cheap-to-clone mock gateway.
#[derive(Clone, Default)]
pub struct MockGateway {
    inner: Arc<Mutex<GatewayInner>>,
}

impl MockGateway {
    /// A gateway that approves everything with generated transaction ids.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next response: approval with the given transaction id.
    pub fn script_success(&self, transaction_id: &str) {
        self.inner.lock().script.push_back(Ok(GatewayResponse {
            success: true,
            transaction_id: Some(transaction_id.to_string()),
            error_code: None,
        }));
    }

    /// Script the next response: a decline with the given error code.
    pub fn script_decline(&self, error_code: &str) {
        self.inner.lock().script.push_back(Ok(GatewayResponse {
            success: false,
            transaction_id: None,
            error_code: Some(error_code.to_string()),
        }));
    }

    /// Script the next response: a transport-level failure.
    pub fn script_error(&self, reason: &str) {
        self.inner
            .lock()
            .script
            .push_back(Err(CommerceError::GatewayFailed {
                reason: reason.to_string(),
            }));
    }

    /// All payment requests seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.inner.lock().requests.clone()
    }

    /// All cancelled transaction ids seen so far.
    #[must_use]
    pub fn cancels(&self) -> Vec<String> {
        self.inner.lock().cancels.clone()
    }
}

impl PaymentGateway for MockGateway {
    async fn request_payment(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
        let mut inner = self.inner.lock();
        inner.requests.push(request.clone());
        if let Some(scripted) = inner.script.pop_front() {
            return scripted;
        }
        inner.txn_seq += 1;
        Ok(GatewayResponse {
            success: true,
            transaction_id: Some(format!("txn-{}", inner.txn_seq)),
            error_code: None,
        })
    }

    async fn cancel_payment(&self, transaction_id: &str) -> Result<GatewayCancelResponse> {
        self.inner
            .lock()
            .cancels
            .push(transaction_id.to_string());
        Ok(GatewayCancelResponse { success: true })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(amount: i64) -> GatewayRequest {
        GatewayRequest {
            order_number: "ORD-1".to_string(),
            amount,
            provider: "TOSS".to_string(),
            method: "CARD".to_string(),
            card_number_masked: Some("****1234".to_string()),
            idempotency_key: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn default_response_approves() {
        let gateway = MockGateway::new();
        let response = gateway.request_payment(&request(15_000)).await.unwrap();
        assert!(response.success);
        assert_eq!(response.transaction_id.as_deref(), Some("txn-1"));
        assert_eq!(gateway.requests().len(), 1);
    }

    #[tokio::test]
    async fn scripted_responses_come_first() {
        let gateway = MockGateway::new();
        gateway.script_decline("INSUFFICIENT_FUNDS");
        gateway.script_success("toss_1");

        let declined = gateway.request_payment(&request(15_000)).await.unwrap();
        assert!(!declined.success);
        assert_eq!(declined.error_code.as_deref(), Some("INSUFFICIENT_FUNDS"));

        let approved = gateway.request_payment(&request(15_000)).await.unwrap();
        assert_eq!(approved.transaction_id.as_deref(), Some("toss_1"));
    }

    #[tokio::test]
    async fn cancels_are_recorded() {
        let gateway = MockGateway::new();
        gateway.cancel_payment("toss_1").await.unwrap();
        assert_eq!(gateway.cancels(), vec!["toss_1".to_string()]);
    }
}
