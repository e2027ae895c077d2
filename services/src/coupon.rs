//! Coupon issuance engine and coupon lifecycle.
//!
//! Issuance is split into a **fast admission path** over memory-store
//! primitives and an **async drain** into durable rows:
//!
//! ```text
//! request ──► soldout? ──► SADD issued ──► INCR counter ──► ZADD queue
//!                │             │               │ n > max: soldout,
//!                ▼             ▼               ▼ SREM, DECR
//!             SOLD_OUT   ALREADY_ISSUED     SOLD_OUT
//! ```
//!
//! The dedup set gates duplicates and the counter gates quantity, so
//! over-issue is impossible even when the drain lags. The drain pops the
//! queue in score order under a per-coupon lock and inserts
//! `UserCoupon(ISSUED)` rows; failed entries are re-queued with their
//! original score so FIFO survives.

use std::time::Duration as StdDuration;
use storefront_core::clock::Clock;
use storefront_core::coupon::AdmissionOutcome;
use storefront_core::error::{CommerceError, Result};
use storefront_core::event::{CouponIssuedPayload, CouponUsedPayload, DomainEvent};
use storefront_core::ids::{CouponId, OrderId, UserId};
use storefront_core::keys;
use storefront_core::lock::{LockManager, with_lock};
use storefront_core::memstore::CouponAdmissionStore;
use storefront_core::outbox::NewOutboxEvent;
use storefront_core::store::CouponStore;
use uuid::Uuid;

/// Entries drained per coupon per tick.
pub const DRAIN_BATCH: usize = 100;

/// Per-coupon drain lock TTL.
const DRAIN_LOCK_TTL: StdDuration = StdDuration::from_secs(5);
/// The drain skips a coupon another instance is draining.
const DRAIN_LOCK_WAIT: StdDuration = StdDuration::from_millis(200);

/// Outcome counters for one drain pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Entries popped from the queue.
    pub popped: usize,
    /// Durable rows written.
    pub issued: usize,
    /// Entries re-queued after a failure.
    pub requeued: usize,
}

/// First-come admission with an exact quantity cap.
pub struct CouponIssueService<S, K, L, C> {
    coupons: S,
    admissions: K,
    locks: L,
    clock: C,
}

impl<S, K, L, C> CouponIssueService<S, K, L, C>
where
    S: CouponStore,
    K: CouponAdmissionStore,
    L: LockManager + Clone + Send + Sync + 'static,
    C: Clock,
{
    /// Create the engine.
    pub const fn new(coupons: S, admissions: K, locks: L, clock: C) -> Self {
        Self {
            coupons,
            admissions,
            locks,
            clock,
        }
    }

    /// Run the admission protocol for one `(coupon, user)` request.
    ///
    /// Rejections (`SOLD_OUT`, `ALREADY_ISSUED`) are outcomes, not errors.
    ///
    /// # Errors
    ///
    /// `CouponNotFound` / `CouponNotUsable` when the coupon does not exist
    /// or is outside its validity window; memory-store errors.
    pub async fn request_issue(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
    ) -> Result<AdmissionOutcome> {
        let max_quantity = self.ensure_activated(coupon_id).await?;

        if self.admissions.is_sold_out(coupon_id).await? {
            return Ok(AdmissionOutcome::SoldOut);
        }
        if !self.admissions.add_issued(coupon_id, user_id).await? {
            return Ok(AdmissionOutcome::AlreadyIssued);
        }

        let position = self.admissions.increment_counter(coupon_id).await?;
        if position > max_quantity {
            // Lost the race for the last unit: flag, roll back, reject.
            self.admissions.set_sold_out(coupon_id).await?;
            self.admissions.remove_issued(coupon_id, user_id).await?;
            self.admissions.decrement_counter(coupon_id).await?;
            return Ok(AdmissionOutcome::SoldOut);
        }

        #[allow(clippy::cast_precision_loss)] // epoch millis fit f64 exactly until year 287396
        let score = self.clock.now().timestamp_millis() as f64;
        self.admissions.push_queue(coupon_id, user_id, score).await?;

        tracing::debug!(
            coupon_id = %coupon_id,
            user_id = %user_id,
            position,
            "coupon admission accepted"
        );
        Ok(AdmissionOutcome::Accepted { position })
    }

    /// Drain one coupon's queue into durable `UserCoupon` rows. Skips
    /// silently when another instance holds the drain lock.
    ///
    /// # Errors
    ///
    /// Memory-store errors from the queue operations.
    pub async fn drain(&self, coupon_id: CouponId) -> Result<DrainStats> {
        let outcome = with_lock(
            &self.locks,
            &keys::coupon_lock(coupon_id),
            DRAIN_LOCK_TTL,
            DRAIN_LOCK_WAIT,
            || self.drain_locked(coupon_id),
        )
        .await;
        match outcome {
            Ok(stats) => Ok(stats),
            Err(CommerceError::LockTimeout { .. }) => Ok(DrainStats::default()),
            Err(e) => Err(e),
        }
    }

    /// Drain every active coupon with a non-empty queue. Worker entry
    /// point (runs every second).
    ///
    /// # Errors
    ///
    /// Store errors from the active-coupon listing; per-coupon drain
    /// failures are contained.
    pub async fn drain_all(&self) -> Result<DrainStats> {
        let mut total = DrainStats::default();
        for coupon in self.coupons.list_active_coupons(self.clock.now()).await? {
            if self.admissions.queue_len(coupon.id).await? == 0 {
                continue;
            }
            match self.drain(coupon.id).await {
                Ok(stats) => {
                    total.popped += stats.popped;
                    total.issued += stats.issued;
                    total.requeued += stats.requeued;
                }
                Err(e) => {
                    tracing::error!(coupon_id = %coupon.id, error = %e, "coupon drain failed");
                }
            }
        }
        Ok(total)
    }

    async fn drain_locked(&self, coupon_id: CouponId) -> Result<DrainStats> {
        let entries = self.admissions.pop_queue(coupon_id, DRAIN_BATCH).await?;
        let mut stats = DrainStats {
            popped: entries.len(),
            ..DrainStats::default()
        };

        for entry in entries {
            let issued_at = self.clock.now();
            let event = DomainEvent::CouponIssued(CouponIssuedPayload {
                user_id: entry.user_id,
                coupon_id,
                correlation_id: Uuid::new_v4(),
            });
            let outcome = self
                .coupons
                .insert_issued(
                    entry.user_id,
                    coupon_id,
                    issued_at,
                    vec![NewOutboxEvent::from_domain(&event)?],
                )
                .await;
            match outcome {
                Ok(_) => stats.issued += 1,
                // A previous drain already wrote the row; the queue entry
                // was just a leftover.
                Err(CommerceError::CouponAlreadyIssued { .. }) => {}
                Err(e) => {
                    tracing::warn!(
                        coupon_id = %coupon_id,
                        user_id = %entry.user_id,
                        error = %e,
                        "durable issue failed; re-queueing"
                    );
                    self.admissions.requeue(coupon_id, &entry).await?;
                    stats.requeued += 1;
                }
            }
        }

        if stats.issued > 0 {
            tracing::info!(coupon_id = %coupon_id, issued = stats.issued, "coupon drain pass");
        }
        Ok(stats)
    }

    /// Make sure the admission state is primed for this coupon, returning
    /// the quantity cap.
    async fn ensure_activated(&self, coupon_id: CouponId) -> Result<i64> {
        if let Some(max) = self.admissions.max_quantity(coupon_id).await? {
            return Ok(max);
        }
        let coupon = self.coupons.get_coupon(coupon_id).await?;
        let now = self.clock.now();
        if !coupon.is_active_at(now) {
            return Err(CommerceError::CouponNotUsable {
                coupon_id,
                reason: "outside validity window".to_string(),
            });
        }
        self.admissions
            .activate(coupon_id, coupon.total_quantity)
            .await?;
        Ok(coupon.total_quantity)
    }
}

/// Coupon consumption and compensation on the durable side.
pub struct CouponService<S, K> {
    coupons: S,
    admissions: K,
}

impl<S, K> CouponService<S, K>
where
    S: CouponStore,
    K: CouponAdmissionStore,
{
    /// Create the service.
    pub const fn new(coupons: S, admissions: K) -> Self {
        Self { coupons, admissions }
    }

    /// Consume the user's coupon for an order, publishing `CouponUsed`.
    /// Replays of the same order are no-ops.
    ///
    /// # Errors
    ///
    /// `CouponNotUsable` when the coupon is not held, already used by a
    /// different order, or expired.
    pub async fn use_for_order(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        order_id: OrderId,
        correlation_id: Uuid,
    ) -> Result<()> {
        let event = DomainEvent::CouponUsed(CouponUsedPayload {
            order_id,
            user_id,
            coupon_id,
            correlation_id,
        });
        self.coupons
            .mark_used(
                user_id,
                coupon_id,
                order_id,
                vec![NewOutboxEvent::from_domain(&event)?],
            )
            .await?;
        Ok(())
    }

    /// Compensation for a cancelled order: revert the user's coupon to
    /// ISSUED, free a unit of quantity, and reopen the fast path (clear
    /// the soldout flag, give the counter back a slot). The user is NOT
    /// re-added to the admission dedup set, so they cannot churn through
    /// issue/cancel cycles.
    ///
    /// # Errors
    ///
    /// Store and memory-store errors.
    pub async fn restore(&self, user_id: UserId, coupon_id: CouponId) -> Result<()> {
        let reverted = self.coupons.restore(user_id, coupon_id, Vec::new()).await?;
        if !reverted {
            // Replay, or the coupon was never used; the fast path must not
            // be credited twice.
            return Ok(());
        }

        let coupon = self.coupons.get_coupon(coupon_id).await?;
        if coupon.issued_quantity < coupon.total_quantity {
            self.admissions.decrement_counter(coupon_id).await?;
            self.admissions.clear_sold_out(coupon_id).await?;
        }
        tracing::info!(user_id = %user_id, coupon_id = %coupon_id, "coupon restored");
        Ok(())
    }

    /// How many ISSUED rows exist for a coupon.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn issued_count(&self, coupon_id: CouponId) -> Result<i64> {
        self.coupons.count_issued(coupon_id).await
    }
}
