//! Payment saga coordinator.
//!
//! Orchestrates balance-check → gateway call → atomic completion for
//! point, gateway and mixed tenders:
//!
//! 1. validate the order and the tender split;
//! 2. check the daily point-use limit;
//! 3. read the balance and record its version (the optimistic guard);
//! 4. call the gateway **outside any database transaction**, under a hard
//!    30 s timeout;
//! 5. commit one atomic completion: version-guarded debit, USE history,
//!    COMPLETED payment row, order `PENDING -> CONFIRMED`, and the
//!    `PaymentCompleted` / `OrderConfirmed` outbox rows;
//! 6. on any failure after a successful gateway call, compensate with
//!    `gateway.cancel` (best-effort, logged) before surfacing the error.
//!
//! Gateway declines and timeouts publish `PaymentFailed`, which the order
//! handler turns into `PENDING -> FAILED`.

use crate::locks::UserLockTable;
use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use storefront_core::clock::Clock;
use storefront_core::error::{CommerceError, Result};
use storefront_core::event::{
    DomainEvent, OrderConfirmedPayload, PaymentCompletedPayload, PaymentFailedPayload, SaleLine,
};
use storefront_core::gateway::{GATEWAY_TIMEOUT, GatewayRequest, PaymentGateway};
use storefront_core::ids::{OrderId, UserId};
use storefront_core::keys;
use storefront_core::lock::{LockManager, with_lock};
use storefront_core::order::{Order, OrderStatus};
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::payment::{
    BalanceDebit, NewPayment, Payment, PaymentCompletion, PaymentMethod, PaymentStatus,
};
use storefront_core::point::{self, BalanceHistoryType, NewBalanceHistory};
use storefront_core::store::{BalanceStore, OrderStore, PaymentStore};
use uuid::Uuid;

/// Distributed lock TTL for one payment attempt; outlives the gateway
/// timeout so the lease survives a slow gateway with renewal to spare.
const PAYMENT_LOCK_TTL: StdDuration = StdDuration::from_secs(40);
/// How long a payment waits for the per-order lock.
const PAYMENT_LOCK_WAIT: StdDuration = StdDuration::from_secs(3);

/// Gateway-specific details of a mixed or gateway tender.
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayCharge {
    /// Provider, e.g. `TOSS`.
    pub provider: String,
    /// Gateway-side method, e.g. `CARD`.
    pub method: String,
    /// Masked card number for card payments.
    pub card_number_masked: Option<String>,
}

/// A payment request as accepted by the saga.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentRequest {
    /// The order to pay.
    pub order_id: OrderId,
    /// The paying user; must own the order.
    pub user_id: UserId,
    /// Tender method.
    pub method: PaymentMethod,
    /// Portion paid from the point balance.
    pub point_amount: i64,
    /// Portion paid through the gateway.
    pub gateway_amount: i64,
    /// Gateway details; required when `gateway_amount > 0`.
    pub gateway: Option<GatewayCharge>,
}

/// Outcome handed back to the HTTP layer.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentReceipt {
    /// The committed payment row.
    pub payment: Payment,
    /// Balance after the debit, when points were used.
    pub balance_after: Option<i64>,
}

/// Orchestrates the payment flow across order, balance and payment
/// aggregates.
pub struct PaymentSaga<S, G, L, C> {
    stores: S,
    gateway: G,
    locks: L,
    lock_table: Arc<UserLockTable>,
    clock: C,
}

impl<S, G, L, C> PaymentSaga<S, G, L, C>
where
    S: OrderStore + BalanceStore + PaymentStore,
    G: PaymentGateway,
    L: LockManager + Clone + Send + Sync + 'static,
    C: Clock,
{
    /// Create the saga coordinator.
    pub const fn new(
        stores: S,
        gateway: G,
        locks: L,
        lock_table: Arc<UserLockTable>,
        clock: C,
    ) -> Self {
        Self {
            stores,
            gateway,
            locks,
            lock_table,
            clock,
        }
    }

    /// Run the payment flow for one request.
    ///
    /// # Errors
    ///
    /// - `OrderNotFound` / `InvalidOrderStatus` / `AlreadyPaidOrder` on a
    ///   bad target;
    /// - `AmountMismatch` / `Validation` on a bad tender split;
    /// - `DailyLimitExceeded` / `PaymentBalanceInsufficient` /
    ///   `UserPointNotFound` on the point side, before any side effect;
    /// - `GatewayFailed` on decline or timeout (with `PaymentFailed`
    ///   published);
    /// - `ConcurrencyConflict` when the balance changed between the check
    ///   and the commit (with the gateway charge compensated).
    pub async fn process(&self, request: PaymentRequest) -> Result<PaymentReceipt> {
        let _local = self.lock_table.lock(request.user_id).await;
        with_lock(
            &self.locks,
            &keys::payment_lock(request.order_id),
            PAYMENT_LOCK_TTL,
            PAYMENT_LOCK_WAIT,
            || self.process_locked(&request),
        )
        .await
    }

    async fn process_locked(&self, request: &PaymentRequest) -> Result<PaymentReceipt> {
        let correlation_id = Uuid::new_v4();
        let order = self.validate_order(request).await?;

        if request.point_amount > 0 {
            self.check_daily_limit(request.user_id, request.point_amount)
                .await?;
        }

        // Observe the balance and its version before the gateway call; the
        // commit below re-checks the version instead of holding a row lock
        // across network I/O.
        let observed = if request.point_amount > 0 {
            let balance = self
                .stores
                .get_balance(request.user_id)
                .await?
                .ok_or(CommerceError::UserPointNotFound {
                    user_id: request.user_id,
                })?;
            if balance.balance < request.point_amount {
                return Err(CommerceError::PaymentBalanceInsufficient {
                    balance: balance.balance,
                    requested: request.point_amount,
                });
            }
            Some(balance)
        } else {
            None
        };

        // Payment accepted; the order leaves PENDING_PAYMENT before any
        // money moves.
        let order = if order.status == OrderStatus::PendingPayment {
            self.stores
                .update_order_status(
                    order.id,
                    OrderStatus::PendingPayment,
                    OrderStatus::Pending,
                    Vec::new(),
                )
                .await?
        } else {
            order
        };

        let gateway_txn = if request.gateway_amount > 0 {
            match self.charge_gateway(request, &order, correlation_id).await {
                Ok(txn) => Some(txn),
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let completion = self.build_completion(
            request,
            &order,
            observed.as_ref().map(|b| (b.balance, b.version)),
            gateway_txn.clone(),
            correlation_id,
        )?;

        match self.stores.complete_payment(completion).await {
            Ok(payment) => {
                tracing::info!(
                    order_id = %order.id,
                    user_id = %request.user_id,
                    amount = payment.amount,
                    point_amount = payment.point_amount,
                    gateway_amount = payment.gateway_amount,
                    external_txn_id = payment.external_txn_id.as_deref().unwrap_or(""),
                    "payment completed"
                );
                Ok(PaymentReceipt {
                    payment,
                    balance_after: observed.map(|b| b.balance - request.point_amount),
                })
            }
            Err(e) => {
                if let Some(txn) = &gateway_txn {
                    self.compensate_gateway(txn).await;
                }
                Err(e)
            }
        }
    }

    /// Validate order ownership, payable status and the tender split.
    async fn validate_order(&self, request: &PaymentRequest) -> Result<Order> {
        let order = self.stores.get_order(request.order_id).await?;
        if order.user_id != request.user_id {
            return Err(CommerceError::OrderNotFound {
                order_id: request.order_id,
            });
        }
        if let Some(payment) = self.stores.get_payment_by_order(request.order_id).await? {
            if payment.status == PaymentStatus::Completed {
                return Err(CommerceError::AlreadyPaidOrder {
                    order_id: request.order_id,
                });
            }
        }
        if !matches!(
            order.status,
            OrderStatus::PendingPayment | OrderStatus::Pending
        ) {
            return Err(CommerceError::InvalidOrderStatus {
                order_id: order.id,
                current: order.status,
                requested: OrderStatus::Confirmed,
            });
        }

        if request.point_amount < 0 || request.gateway_amount < 0 {
            return Err(CommerceError::Validation {
                message: "tender amounts must be non-negative".to_string(),
            });
        }
        if request.point_amount + request.gateway_amount != order.final_amount {
            return Err(CommerceError::AmountMismatch {
                expected: order.final_amount,
                actual: request.point_amount + request.gateway_amount,
            });
        }
        let split_ok = match request.method {
            PaymentMethod::Balance => request.gateway_amount == 0 && request.point_amount > 0,
            PaymentMethod::Card | PaymentMethod::BankTransfer => {
                request.point_amount == 0 && request.gateway_amount > 0
            }
            PaymentMethod::Mixed => request.point_amount > 0 && request.gateway_amount > 0,
        };
        if !split_ok {
            return Err(CommerceError::Validation {
                message: format!("tender split does not match method {}", request.method),
            });
        }
        if request.gateway_amount > 0 && request.gateway.is_none() {
            return Err(CommerceError::Validation {
                message: "gateway details required for a gateway tender".to_string(),
            });
        }
        Ok(order)
    }

    async fn check_daily_limit(&self, user_id: UserId, amount: i64) -> Result<()> {
        let now = self.clock.now();
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |naive| naive.and_utc());
        let used_today = self
            .stores
            .sum_used_between(user_id, day_start, day_start + Duration::days(1))
            .await?;
        if used_today + amount > point::DAILY_USE_LIMIT {
            return Err(CommerceError::DailyLimitExceeded {
                used_today,
                requested: amount,
                limit: point::DAILY_USE_LIMIT,
            });
        }
        Ok(())
    }

    /// Call the gateway outside any database transaction. Declines,
    /// transport failures and the 30 s timeout all publish
    /// `PaymentFailed` and surface as `GatewayFailed`.
    async fn charge_gateway(
        &self,
        request: &PaymentRequest,
        order: &Order,
        correlation_id: Uuid,
    ) -> Result<String> {
        // The request is rebuilt on retries with the same idempotency key
        // derived from the correlation id.
        let charge = request.gateway.as_ref();
        let gateway_request = GatewayRequest {
            order_number: order.order_number.clone(),
            amount: request.gateway_amount,
            provider: charge.map_or_else(|| "TOSS".to_string(), |c| c.provider.clone()),
            method: charge.map_or_else(|| "CARD".to_string(), |c| c.method.clone()),
            card_number_masked: charge.and_then(|c| c.card_number_masked.clone()),
            idempotency_key: correlation_id,
        };

        let outcome =
            tokio::time::timeout(GATEWAY_TIMEOUT, self.gateway.request_payment(&gateway_request))
                .await;

        let failure_reason = match outcome {
            Ok(Ok(response)) if response.success => match response.transaction_id {
                Some(txn) => return Ok(txn),
                None => "gateway approved without a transaction id".to_string(),
            },
            Ok(Ok(response)) => response
                .error_code
                .unwrap_or_else(|| "DECLINED".to_string()),
            Ok(Err(e)) => e.to_string(),
            Err(_elapsed) => "gateway timeout".to_string(),
        };

        tracing::warn!(
            order_id = %order.id,
            reason = failure_reason.as_str(),
            "gateway payment failed"
        );
        let failed = DomainEvent::PaymentFailed(PaymentFailedPayload {
            order_id: order.id,
            user_id: order.user_id,
            reason: failure_reason.clone(),
            correlation_id,
        });
        self.stores
            .mark_payment_failed(
                order.id,
                &failure_reason,
                vec![NewOutboxEvent::from_domain(&failed)?],
            )
            .await?;
        Err(CommerceError::GatewayFailed {
            reason: failure_reason,
        })
    }

    fn build_completion(
        &self,
        request: &PaymentRequest,
        order: &Order,
        observed: Option<(i64, i64)>,
        gateway_txn: Option<String>,
        correlation_id: Uuid,
    ) -> Result<PaymentCompletion> {
        let payment = NewPayment {
            order_id: order.id,
            user_id: request.user_id,
            method: request.method,
            status: PaymentStatus::Completed,
            external_txn_id: gateway_txn,
            amount: order.final_amount,
            point_amount: request.point_amount,
            gateway_amount: request.gateway_amount,
        }
        .validated()?;

        let (debit, history) = match observed {
            Some((balance_before, version)) => {
                let debit = BalanceDebit {
                    user_id: request.user_id,
                    amount: request.point_amount,
                    expected_version: version,
                };
                let history = NewBalanceHistory::validated(
                    request.user_id,
                    -request.point_amount,
                    BalanceHistoryType::Use,
                    balance_before,
                    Some(order.id),
                    format!("payment for order {}", order.order_number),
                )?;
                (Some(debit), Some(history))
            }
            None => (None, None),
        };

        let completed = DomainEvent::PaymentCompleted(PaymentCompletedPayload {
            order_id: order.id,
            user_id: request.user_id,
            amount: order.final_amount,
            method: request.method,
            external_txn_id: payment.external_txn_id.clone(),
            correlation_id,
        });
        let confirmed = DomainEvent::OrderConfirmed(OrderConfirmedPayload {
            order_id: order.id,
            user_id: order.user_id,
            items: order
                .items
                .iter()
                .map(|item| SaleLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
            correlation_id,
        });

        Ok(PaymentCompletion {
            payment,
            debit,
            history,
            order_id: order.id,
            order_from: OrderStatus::Pending,
            order_to: OrderStatus::Confirmed,
            events: vec![
                NewOutboxEvent::from_domain(&completed)?,
                NewOutboxEvent::from_domain(&confirmed)?,
            ],
        })
    }

    /// Best-effort gateway reversal; the failure is logged, not surfaced —
    /// the caller's error already describes what went wrong.
    async fn compensate_gateway(&self, transaction_id: &str) {
        match self.gateway.cancel_payment(transaction_id).await {
            Ok(response) if response.success => {
                tracing::info!(transaction_id, "gateway charge compensated");
            }
            Ok(_) => {
                tracing::error!(transaction_id, "gateway refused the compensation");
            }
            Err(e) => {
                tracing::error!(transaction_id, error = %e, "gateway compensation failed");
            }
        }
    }
}
