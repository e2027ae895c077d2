//! Point balance engine: charge, deduct, refund and histories.
//!
//! Concurrency control is layered: the in-process per-user lock table
//! (FIFO) serializes same-user operations within a process, the
//! distributed lock (`ecom:lock:pt:{user}`) serializes across instances,
//! and the optimistic version re-check inside
//! [`BalanceStore::apply_balance_change`] catches anything that slips through. Version
//! conflicts are retried locally with jittered backoff before surfacing.

use crate::locks::UserLockTable;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use storefront_core::clock::Clock;
use storefront_core::error::{CommerceError, Result};
use storefront_core::ids::{OrderId, UserId};
use storefront_core::keys;
use storefront_core::lock::{LockManager, with_lock};
use storefront_core::point::{
    self, BalanceHistory, BalanceHistoryType, NewBalanceHistory, UserBalance,
};
use storefront_core::store::BalanceStore;
use storefront_runtime::retry::{RetryPolicy, retry_with_predicate};

/// Distributed lock TTL for point operations.
const LOCK_TTL: StdDuration = StdDuration::from_secs(10);
/// How long a point operation waits for the distributed lock.
const LOCK_WAIT: StdDuration = StdDuration::from_secs(5);
/// Cap on returned history rows.
const HISTORY_LIMIT: usize = 100;

/// Owns the point balance aggregate.
pub struct PointService<S, L, C> {
    balances: S,
    locks: L,
    lock_table: Arc<UserLockTable>,
    clock: C,
}

impl<S, L, C> PointService<S, L, C>
where
    S: BalanceStore,
    L: LockManager + Clone + Send + Sync + 'static,
    C: Clock,
{
    /// Create the service.
    pub const fn new(balances: S, locks: L, lock_table: Arc<UserLockTable>, clock: C) -> Self {
        Self {
            balances,
            locks,
            lock_table,
            clock,
        }
    }

    /// Current balance.
    ///
    /// # Errors
    ///
    /// `UserPointNotFound` when the user has no balance row.
    pub async fn balance(&self, user_id: UserId) -> Result<UserBalance> {
        self.balances
            .get_balance(user_id)
            .await?
            .ok_or(CommerceError::UserPointNotFound { user_id })
    }

    /// Histories, newest first, capped at 100.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn histories(&self, user_id: UserId) -> Result<Vec<BalanceHistory>> {
        self.balances.histories(user_id, HISTORY_LIMIT).await
    }

    /// Charge points: `amount ∈ [1_000, 1_000_000]`, multiple of 100, and
    /// the result must not exceed `MAX_BALANCE`. Creates the balance row
    /// when absent.
    ///
    /// # Errors
    ///
    /// `InvalidPointAmount`, `MaxBalanceExceeded`, lock and store errors.
    pub async fn charge(
        &self,
        user_id: UserId,
        amount: i64,
        description: &str,
    ) -> Result<UserBalance> {
        point::validate_charge_amount(amount)?;
        let _local = self.lock_table.lock(user_id).await;
        with_lock(
            &self.locks,
            &keys::point_lock(user_id),
            LOCK_TTL,
            LOCK_WAIT,
            || async {
                self.apply_with_conflict_retry(user_id, || async {
                    let balance = self.balances.get_or_create_balance(user_id).await?;
                    if balance.balance + amount > point::MAX_BALANCE {
                        return Err(CommerceError::MaxBalanceExceeded {
                            balance: balance.balance,
                            requested: amount,
                            max: point::MAX_BALANCE,
                        });
                    }
                    let history = NewBalanceHistory::validated(
                        user_id,
                        amount,
                        BalanceHistoryType::Earn,
                        balance.balance,
                        None,
                        description.to_string(),
                    )?;
                    self.balances
                        .apply_balance_change(user_id, balance.version, history, Vec::new())
                        .await
                })
                .await
            },
        )
        .await
    }

    /// Deduct points: `amount ≥ 100`, multiple of 100, within the balance
    /// and the daily use limit.
    ///
    /// # Errors
    ///
    /// `MinimumUseAmount`, `InvalidPointAmount`, `InsufficientBalance`,
    /// `DailyLimitExceeded`, `UserPointNotFound`, lock and store errors.
    pub async fn deduct(
        &self,
        user_id: UserId,
        amount: i64,
        order_id: Option<OrderId>,
        description: &str,
    ) -> Result<UserBalance> {
        point::validate_use_amount(amount)?;
        let _local = self.lock_table.lock(user_id).await;
        with_lock(
            &self.locks,
            &keys::point_lock(user_id),
            LOCK_TTL,
            LOCK_WAIT,
            || async {
                self.check_daily_limit(user_id, amount).await?;
                self.apply_with_conflict_retry(user_id, || async {
                    let balance = self
                        .balances
                        .get_balance(user_id)
                        .await?
                        .ok_or(CommerceError::UserPointNotFound { user_id })?;
                    if balance.balance < amount {
                        return Err(CommerceError::InsufficientBalance {
                            balance: balance.balance,
                            requested: amount,
                        });
                    }
                    let history = NewBalanceHistory::validated(
                        user_id,
                        -amount,
                        BalanceHistoryType::Use,
                        balance.balance,
                        order_id,
                        description.to_string(),
                    )?;
                    self.balances
                        .apply_balance_change(user_id, balance.version, history, Vec::new())
                        .await
                })
                .await
            },
        )
        .await
    }

    /// Refund points for a cancelled order. Idempotent on
    /// `(user, order)`: a second refund for the same pair is a no-op.
    ///
    /// # Errors
    ///
    /// `MaxBalanceExceeded`, lock and store errors.
    pub async fn refund(
        &self,
        user_id: UserId,
        amount: i64,
        order_id: OrderId,
    ) -> Result<UserBalance> {
        let _local = self.lock_table.lock(user_id).await;
        with_lock(
            &self.locks,
            &keys::point_lock(user_id),
            LOCK_TTL,
            LOCK_WAIT,
            || async {
                if self.balances.has_refund_for_order(user_id, order_id).await? {
                    tracing::info!(
                        user_id = %user_id,
                        order_id = %order_id,
                        "refund already applied; skipping"
                    );
                    return self
                        .balances
                        .get_balance(user_id)
                        .await?
                        .ok_or(CommerceError::UserPointNotFound { user_id });
                }
                self.apply_with_conflict_retry(user_id, || async {
                    let balance = self.balances.get_or_create_balance(user_id).await?;
                    if balance.balance + amount > point::MAX_BALANCE {
                        return Err(CommerceError::MaxBalanceExceeded {
                            balance: balance.balance,
                            requested: amount,
                            max: point::MAX_BALANCE,
                        });
                    }
                    let history = NewBalanceHistory::validated(
                        user_id,
                        amount,
                        BalanceHistoryType::Refund,
                        balance.balance,
                        Some(order_id),
                        format!("refund for order {order_id}"),
                    )?;
                    self.balances
                        .apply_balance_change(user_id, balance.version, history, Vec::new())
                        .await
                })
                .await
            },
        )
        .await
    }

    /// Sum of today's USE amounts plus `amount` must stay within the daily
    /// limit.
    async fn check_daily_limit(&self, user_id: UserId, amount: i64) -> Result<()> {
        let (day_start, day_end) = utc_day_bounds(self.clock.now());
        let used_today = self
            .balances
            .sum_used_between(user_id, day_start, day_end)
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

    /// Retry version conflicts up to 3 times with jittered backoff.
    async fn apply_with_conflict_retry<F, Fut>(
        &self,
        user_id: UserId,
        operation: F,
    ) -> Result<UserBalance>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<UserBalance>>,
    {
        let result = retry_with_predicate(
            RetryPolicy::conflict(),
            operation,
            CommerceError::is_retryable_conflict,
        )
        .await;
        if let Err(CommerceError::ConcurrencyConflict { .. }) = &result {
            tracing::warn!(user_id = %user_id, "balance version conflict persisted through retries");
        }
        result
    }
}

/// `[00:00, 24:00)` of the UTC day containing `now`.
fn utc_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(now, |naive| naive.and_utc());
    (day_start, day_start + Duration::days(1))
}
