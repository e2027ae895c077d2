//! Wire shapes of the HTTP surface (camelCase JSON).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storefront_core::coupon::AdmissionOutcome;
use storefront_core::error::{CommerceError, Result};
use storefront_core::ids::{CouponId, OrderId, ProductId, UserId};
use storefront_core::order::{Order, OrderItem};
use storefront_core::payment::PaymentMethod;
use storefront_core::point::{BalanceHistory, UserBalance};
use storefront_services::payment::{GatewayCharge, PaymentReceipt, PaymentRequest};

/// `GET /users/me/balance` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    /// The user.
    pub user_id: UserId,
    /// Balance in minor units.
    pub balance: i64,
    /// Last change time.
    pub last_updated: DateTime<Utc>,
}

impl From<UserBalance> for BalanceResponse {
    fn from(balance: UserBalance) -> Self {
        Self {
            user_id: balance.user_id,
            balance: balance.balance,
            last_updated: balance.updated_at,
        }
    }
}

/// One line of an order creation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    /// The product.
    pub product_id: ProductId,
    /// Display name captured at order time.
    pub product_name: String,
    /// Unit price in minor units.
    pub unit_price: i64,
    /// Units ordered.
    pub quantity: u32,
    /// Gift wrap requested.
    #[serde(default)]
    pub gift_wrap: bool,
    /// Gift wrap surcharge.
    #[serde(default)]
    pub gift_wrap_price: i64,
}

impl From<OrderItemRequest> for OrderItem {
    fn from(item: OrderItemRequest) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name,
            unit_price: item.unit_price,
            quantity: item.quantity,
            gift_wrap: item.gift_wrap,
            gift_wrap_price: item.gift_wrap_price,
        }
    }
}

/// `POST /orders` request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Line items.
    pub items: Vec<OrderItemRequest>,
    /// Coupons to apply (set semantics).
    #[serde(default)]
    pub coupon_ids: Vec<CouponId>,
}

/// Order representation in responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    /// Database id.
    pub order_id: OrderId,
    /// Human-readable number.
    pub order_number: String,
    /// Ordering user.
    pub user_id: UserId,
    /// Sum of item totals.
    pub total_amount: i64,
    /// Coupon discount.
    pub discount_amount: i64,
    /// Amount to pay.
    pub final_amount: i64,
    /// Lifecycle status string.
    pub status: String,
    /// Coupons consumed.
    pub used_coupon_ids: Vec<CouponId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            total_amount: order.total_amount,
            discount_amount: order.discount_amount,
            final_amount: order.final_amount,
            status: order.status.as_str().to_string(),
            used_coupon_ids: order.used_coupon_ids,
            created_at: order.created_at,
        }
    }
}

/// Gateway details inside a payment request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PgPaymentRequest {
    /// Provider, e.g. `TOSS`.
    pub provider: String,
    /// Gateway-side method, e.g. `CARD`.
    pub method: String,
    /// Masked card number.
    #[serde(default)]
    pub card_number_masked: Option<String>,
}

/// `POST /payments` request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentApiRequest {
    /// The order to pay.
    pub order_id: OrderId,
    /// Tender: `POINT`, `GATEWAY` or `MIXED`.
    pub payment_method: String,
    /// Point portion.
    #[serde(default)]
    pub point_amount: i64,
    /// Gateway portion.
    #[serde(default)]
    pub pg_amount: i64,
    /// Gateway details when `pg_amount > 0`.
    #[serde(default)]
    pub pg_payment_request: Option<PgPaymentRequest>,
}

impl PaymentApiRequest {
    /// Map the wire tender onto the domain request.
    ///
    /// # Errors
    ///
    /// `Validation` for an unknown tender string.
    pub fn into_domain(self, user_id: UserId) -> Result<PaymentRequest> {
        let method = match self.payment_method.as_str() {
            "POINT" => PaymentMethod::Balance,
            "MIXED" => PaymentMethod::Mixed,
            "GATEWAY" => match self.pg_payment_request.as_ref().map(|pg| pg.method.as_str()) {
                Some("BANK_TRANSFER") => PaymentMethod::BankTransfer,
                _ => PaymentMethod::Card,
            },
            other => {
                return Err(CommerceError::Validation {
                    message: format!("unknown payment method: {other}"),
                });
            }
        };
        Ok(PaymentRequest {
            order_id: self.order_id,
            user_id,
            method,
            point_amount: self.point_amount,
            gateway_amount: self.pg_amount,
            gateway: self.pg_payment_request.map(|pg| GatewayCharge {
                provider: pg.provider,
                method: pg.method,
                card_number_masked: pg.card_number_masked,
            }),
        })
    }
}

/// `POST /payments` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    /// Payment row id.
    pub payment_id: i64,
    /// The paid order.
    pub order_id: OrderId,
    /// Total settled.
    pub total_amount: i64,
    /// Point portion.
    pub point_amount: i64,
    /// Gateway portion.
    pub pg_amount: i64,
    /// Payment status string.
    pub status: String,
    /// Settlement time.
    pub paid_at: Option<DateTime<Utc>>,
    /// Gateway transaction id.
    pub pg_transaction_id: Option<String>,
    /// Balance after the debit, when points were used.
    pub balance_after: Option<i64>,
}

impl From<PaymentReceipt> for PaymentResponse {
    fn from(receipt: PaymentReceipt) -> Self {
        Self {
            payment_id: receipt.payment.id,
            order_id: receipt.payment.order_id,
            total_amount: receipt.payment.amount,
            point_amount: receipt.payment.point_amount,
            pg_amount: receipt.payment.gateway_amount,
            status: receipt.payment.status.as_str().to_string(),
            paid_at: receipt.payment.paid_at,
            pg_transaction_id: receipt.payment.external_txn_id,
            balance_after: receipt.balance_after,
        }
    }
}

/// `POST /points/{userId}/charge` request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    /// Amount in minor units.
    pub amount: i64,
    /// Optional description for the audit row.
    #[serde(default)]
    pub description: Option<String>,
}

/// `POST /points/{userId}/deduct` request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductRequest {
    /// Amount in minor units.
    pub amount: i64,
    /// Related order, if any.
    #[serde(default)]
    pub order_id: Option<OrderId>,
    /// Optional description for the audit row.
    #[serde(default)]
    pub description: Option<String>,
}

/// One history row in `GET /points/{userId}/histories`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// Row id.
    pub id: i64,
    /// Signed amount.
    pub amount: i64,
    /// EARN / USE / EXPIRE / REFUND.
    pub history_type: String,
    /// Balance before.
    pub balance_before: i64,
    /// Balance after.
    pub balance_after: i64,
    /// Related order.
    pub order_id: Option<OrderId>,
    /// Description.
    pub description: String,
    /// When.
    pub created_at: DateTime<Utc>,
}

impl From<BalanceHistory> for HistoryResponse {
    fn from(history: BalanceHistory) -> Self {
        Self {
            id: history.id,
            amount: history.amount,
            history_type: history.history_type.as_str().to_string(),
            balance_before: history.balance_before,
            balance_after: history.balance_after,
            order_id: history.order_id,
            description: history.description,
            created_at: history.created_at,
        }
    }
}

/// `POST /coupons/{id}/issue` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResponse {
    /// `ACCEPTED`, `ALREADY_ISSUED` or `SOLD_OUT`.
    pub status: String,
    /// 1-based admission position when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<i64>,
}

impl From<AdmissionOutcome> for IssueResponse {
    fn from(outcome: AdmissionOutcome) -> Self {
        match outcome {
            AdmissionOutcome::Accepted { position } => Self {
                status: "ACCEPTED".to_string(),
                queue_position: Some(position),
            },
            AdmissionOutcome::AlreadyIssued => Self {
                status: "ALREADY_ISSUED".to_string(),
                queue_position: None,
            },
            AdmissionOutcome::SoldOut => Self {
                status: "SOLD_OUT".to_string(),
                queue_position: None,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn payment_request_maps_tenders() {
        let request: PaymentApiRequest = serde_json::from_value(serde_json::json!({
            "orderId": 1,
            "paymentMethod": "MIXED",
            "pointAmount": 20_000,
            "pgAmount": 15_000,
            "pgPaymentRequest": {
                "provider": "TOSS",
                "method": "CARD",
                "cardNumberMasked": "****1234"
            }
        }))
        .unwrap();

        let domain = request.into_domain(UserId::new(1)).unwrap();
        assert_eq!(domain.method, PaymentMethod::Mixed);
        assert_eq!(domain.point_amount, 20_000);
        assert_eq!(domain.gateway_amount, 15_000);
        assert_eq!(domain.gateway.unwrap().provider, "TOSS");
    }

    #[test]
    fn unknown_tender_is_rejected() {
        let request: PaymentApiRequest = serde_json::from_value(serde_json::json!({
            "orderId": 1,
            "paymentMethod": "CRYPTO",
        }))
        .unwrap();
        assert!(request.into_domain(UserId::new(1)).is_err());
    }

    #[test]
    fn issue_response_shapes() {
        let accepted = IssueResponse::from(AdmissionOutcome::Accepted { position: 42 });
        let json = serde_json::to_value(&accepted).unwrap();
        assert_eq!(json["status"], "ACCEPTED");
        assert_eq!(json["queuePosition"], 42);

        let sold_out = IssueResponse::from(AdmissionOutcome::SoldOut);
        let json = serde_json::to_value(&sold_out).unwrap();
        assert_eq!(json["status"], "SOLD_OUT");
        assert!(json.get("queuePosition").is_none());
    }
}
