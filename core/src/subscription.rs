//! Subscription lifecycle reconciler.
//!
//! Owns the per-member subscription state machine and keeps it
//! synchronized with the external processor's event stream. Access
//! rights derive from status and expiration together: a scheduled
//! cancellation still grants access until expiration, a suspension
//! revokes access immediately regardless of any remaining paid period.

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::external::ProcessorClient;
use crate::store::SubscriptionStore;
use crate::types::{MemberId, PlanId, Subscription, SubscriptionId, SubscriptionStatus};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Expiration horizon for lifetime grants, far enough out to outlive
/// any member.
pub const LIFETIME_HORIZON_DAYS: i64 = 36_500;

/// Subscription state as reported by the external processor, after
/// folding its status string and cancel-at-period-end flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSubscriptionState {
    /// Billing healthy, no cancellation scheduled.
    Active,
    /// Billing healthy, cancellation scheduled at period end.
    PendingCancellation,
    /// Billing failed or the subscription is gone.
    Suspended,
}

impl ExternalSubscriptionState {
    const fn as_status(self) -> SubscriptionStatus {
        match self {
            Self::Active => SubscriptionStatus::Active,
            Self::PendingCancellation => SubscriptionStatus::PendingCancellation,
            Self::Suspended => SubscriptionStatus::Suspended,
        }
    }
}

/// Drives the subscription state machine.
#[derive(Clone)]
pub struct SubscriptionReconciler<S, X> {
    subscriptions: S,
    processor: X,
    clock: Arc<dyn Clock>,
}

impl<S, X> SubscriptionReconciler<S, X>
where
    S: SubscriptionStore,
    X: ProcessorClient,
{
    /// Wire the reconciler to its store and processor client.
    pub fn new(subscriptions: S, processor: X, clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriptions,
            processor,
            clock,
        }
    }

    /// Activate a subscription for a member on a plan.
    ///
    /// If a row already exists for this member and plan it is
    /// reactivated in place (expiration reset to now + plan duration,
    /// status back to `Active`) rather than duplicated, which covers a
    /// member re-subscribing to the same plan. Replaying the same
    /// activation (same external reference, still active) is a no-op.
    ///
    /// # Errors
    ///
    /// `NotFound` if the plan does not exist, `Store` on round-trip
    /// failure.
    pub async fn activate(
        &self,
        member: MemberId,
        plan: PlanId,
        external_ref: &str,
    ) -> Result<Subscription> {
        let plan = self.subscriptions.get_plan(plan).await?;
        let now = self.clock.now();
        let expires_at = now + Duration::days(plan.duration_days);

        if let Some(existing) = self
            .subscriptions
            .find_subscription_for_plan(member, plan.id)
            .await?
        {
            if existing.status == SubscriptionStatus::Active
                && existing.external_ref.as_deref() == Some(external_ref)
                && existing.expires_at > now
            {
                tracing::debug!(member_id = %member, "activation already applied");
                return Ok(existing);
            }

            let updated = Subscription {
                status: SubscriptionStatus::Active,
                expires_at,
                external_ref: Some(external_ref.to_string()),
                ..existing
            };
            self.subscriptions.update_subscription(&updated).await?;
            tracing::info!(member_id = %member, plan = %plan.name, "subscription reactivated");
            return Ok(updated);
        }

        let subscription = Subscription {
            id: SubscriptionId::new(),
            member_id: member,
            plan_id: plan.id,
            started_at: now,
            expires_at,
            status: SubscriptionStatus::Active,
            external_ref: Some(external_ref.to_string()),
        };
        self.subscriptions.insert_subscription(&subscription).await?;
        tracing::info!(member_id = %member, plan = %plan.name, "subscription activated");
        Ok(subscription)
    }

    /// Extend a subscription on a successful recurring payment.
    ///
    /// The new expiration is the later of the stored expiration and the
    /// candidate, never "now + duration": a late-processed notification
    /// cannot shrink the member's paid-for period, and replaying the
    /// same notification is a no-op. A suspended subscription comes
    /// back to `Active`, since the processor has just charged
    /// successfully.
    ///
    /// # Errors
    ///
    /// `NotFound` if the member has no subscription, `Conflict` if the
    /// external reference does not match the stored one, `Store` on
    /// round-trip failure.
    pub async fn extend(
        &self,
        member: MemberId,
        external_ref: &str,
        period_end: Option<DateTime<Utc>>,
    ) -> Result<Subscription> {
        let subscription = self
            .subscriptions
            .find_subscription(member)
            .await?
            .ok_or(CoreError::not_found("Subscription"))?;

        if subscription.external_ref.as_deref() != Some(external_ref) {
            return Err(CoreError::conflict(
                "renewal does not match the member's subscription reference",
            ));
        }

        let candidate = match period_end {
            Some(period_end) => period_end,
            None => {
                let plan = self.subscriptions.get_plan(subscription.plan_id).await?;
                subscription.expires_at + Duration::days(plan.duration_days)
            }
        };

        let mut extended = self
            .subscriptions
            .extend_subscription(subscription.id, candidate)
            .await?;

        if extended.status == SubscriptionStatus::Suspended {
            extended.status = SubscriptionStatus::Active;
            self.subscriptions.update_subscription(&extended).await?;
        }

        tracing::info!(
            member_id = %member,
            expires_at = %extended.expires_at,
            "subscription extended"
        );
        Ok(extended)
    }

    /// Schedule cancellation at period end. Access continues until
    /// expiration. Idempotent when already pending.
    ///
    /// # Errors
    ///
    /// `NotFound` if the member has no subscription, `Conflict` if the
    /// subscription is suspended or a lifetime grant, `Store` on
    /// round-trip failure.
    pub async fn mark_pending_cancellation(&self, member: MemberId) -> Result<Subscription> {
        let subscription = self
            .subscriptions
            .find_subscription(member)
            .await?
            .ok_or(CoreError::not_found("Subscription"))?;

        if subscription.is_lifetime() {
            return Err(CoreError::conflict("a lifetime grant has no billing to cancel"));
        }

        match subscription.status {
            SubscriptionStatus::PendingCancellation => Ok(subscription),
            SubscriptionStatus::Active => {
                let updated = Subscription {
                    status: SubscriptionStatus::PendingCancellation,
                    ..subscription
                };
                self.subscriptions.update_subscription(&updated).await?;
                tracing::info!(member_id = %member, "cancellation scheduled at period end");
                Ok(updated)
            }
            SubscriptionStatus::Suspended => Err(CoreError::conflict(
                "a suspended subscription cannot schedule cancellation",
            )),
        }
    }

    /// Member-facing reactivation: undo a scheduled cancellation, or
    /// resume a suspended subscription whose paid period has not yet
    /// elapsed. Idempotent when already active.
    ///
    /// # Errors
    ///
    /// `NotFound` if the member has no subscription, `Conflict` if the
    /// paid period is over, `Store` on round-trip failure.
    pub async fn reactivate(&self, member: MemberId) -> Result<Subscription> {
        let subscription = self
            .subscriptions
            .find_subscription(member)
            .await?
            .ok_or(CoreError::not_found("Subscription"))?;

        if subscription.status == SubscriptionStatus::Active {
            return Ok(subscription);
        }

        let reactivatable = subscription.status == SubscriptionStatus::PendingCancellation
            || subscription.expires_at > self.clock.now();
        if !reactivatable {
            return Err(CoreError::conflict(
                "the paid period is over, subscribe again instead",
            ));
        }

        let updated = Subscription {
            status: SubscriptionStatus::Active,
            ..subscription
        };
        self.subscriptions.update_subscription(&updated).await?;
        tracing::info!(member_id = %member, "subscription reactivated");
        Ok(updated)
    }

    /// Suspend on payment failure: access revoked immediately even if
    /// the old period has not technically elapsed. Idempotent.
    ///
    /// # Errors
    ///
    /// `NotFound` if the member has no subscription, `Store` on
    /// round-trip failure.
    pub async fn suspend(&self, member: MemberId) -> Result<Subscription> {
        let subscription = self
            .subscriptions
            .find_subscription(member)
            .await?
            .ok_or(CoreError::not_found("Subscription"))?;

        if subscription.status == SubscriptionStatus::Suspended {
            return Ok(subscription);
        }

        let updated = Subscription {
            status: SubscriptionStatus::Suspended,
            ..subscription
        };
        self.subscriptions.update_subscription(&updated).await?;
        tracing::warn!(member_id = %member, "subscription suspended");
        Ok(updated)
    }

    /// Fold a processor-reported state directly into the stored row.
    ///
    /// Used by event ingestion, where the processor is the source of
    /// truth; the member-facing legality rules of [`Self::reactivate`]
    /// do not apply. Idempotent when the stored status already matches.
    ///
    /// # Errors
    ///
    /// `NotFound` if the member has no subscription, `Store` on
    /// round-trip failure.
    pub async fn apply_external_state(
        &self,
        member: MemberId,
        state: ExternalSubscriptionState,
    ) -> Result<Subscription> {
        let subscription = self
            .subscriptions
            .find_subscription(member)
            .await?
            .ok_or(CoreError::not_found("Subscription"))?;

        let desired = state.as_status();
        if subscription.status == desired {
            return Ok(subscription);
        }

        let updated = Subscription {
            status: desired,
            ..subscription
        };
        self.subscriptions.update_subscription(&updated).await?;
        tracing::info!(
            member_id = %member,
            status = desired.as_str(),
            "subscription state reconciled"
        );
        Ok(updated)
    }

    /// Grant a lifetime subscription, bypassing the payment processor.
    ///
    /// Any externally billed subscription is cancelled with the
    /// processor *before* local state commits, so the member is never
    /// billed again after the grant; a processor failure aborts the
    /// grant entirely.
    ///
    /// # Errors
    ///
    /// `Processor` if the external cancellation fails, `Validation` if
    /// the member has no subscription and no plan was supplied,
    /// `NotFound` if the supplied plan does not exist, `Store` on
    /// round-trip failure.
    pub async fn grant_lifetime(
        &self,
        member: MemberId,
        plan: Option<PlanId>,
    ) -> Result<Subscription> {
        let now = self.clock.now();
        let horizon = now + Duration::days(LIFETIME_HORIZON_DAYS);

        if let Some(existing) = self.subscriptions.find_subscription(member).await? {
            if let Some(external_ref) = existing.external_ref.as_deref() {
                self.processor.cancel_subscription(external_ref).await?;
            }

            let updated = Subscription {
                status: SubscriptionStatus::Active,
                expires_at: horizon,
                external_ref: None,
                ..existing
            };
            self.subscriptions.update_subscription(&updated).await?;
            tracing::info!(member_id = %member, "lifetime subscription granted");
            return Ok(updated);
        }

        let plan = plan.ok_or_else(|| {
            CoreError::validation("a plan is required to grant lifetime to an unsubscribed member")
        })?;
        let plan = self.subscriptions.get_plan(plan).await?;

        let subscription = Subscription {
            id: SubscriptionId::new(),
            member_id: member,
            plan_id: plan.id,
            started_at: now,
            expires_at: horizon,
            status: SubscriptionStatus::Active,
            external_ref: None,
        };
        self.subscriptions.insert_subscription(&subscription).await?;
        tracing::info!(member_id = %member, "lifetime subscription granted");
        Ok(subscription)
    }

    /// Whether the member currently has streaming access.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    pub async fn has_access(&self, member: MemberId) -> Result<bool> {
        let Some(subscription) = self.subscriptions.find_subscription(member).await? else {
            return Ok(false);
        };
        Ok(matches!(
            subscription.status,
            SubscriptionStatus::Active | SubscriptionStatus::PendingCancellation
        ) && subscription.expires_at > self.clock.now())
    }

    /// Days of paid access left, rounded up. `None` without a
    /// subscription.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    pub async fn days_remaining(&self, member: MemberId) -> Result<Option<i64>> {
        let Some(subscription) = self.subscriptions.find_subscription(member).await? else {
            return Ok(None);
        };
        let seconds = (subscription.expires_at - self.clock.now()).num_seconds();
        Ok(Some(seconds.div_ceil(86_400)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::{MemoryLedger, MockProcessor};
    use crate::types::Plan;

    struct Fixture {
        reconciler: SubscriptionReconciler<MemoryLedger, MockProcessor>,
        ledger: MemoryLedger,
        processor: MockProcessor,
        clock: FixedClock,
        plan: Plan,
    }

    fn fixture() -> Fixture {
        let ledger = MemoryLedger::new();
        let processor = MockProcessor::new();
        let clock = FixedClock::at("2026-05-10T09:00:00Z".parse().unwrap());
        let plan = Plan {
            id: PlanId::new(),
            name: "Cinephile".to_string(),
            duration_days: 30,
            external_price_ref: "price_cinephile_monthly".to_string(),
        };
        ledger.seed_plan(plan.clone()).unwrap();
        let reconciler = SubscriptionReconciler::new(
            ledger.clone(),
            processor.clone(),
            Arc::new(clock.clone()),
        );
        Fixture {
            reconciler,
            ledger,
            processor,
            clock,
            plan,
        }
    }

    #[tokio::test]
    async fn activation_creates_a_thirty_day_window() {
        let f = fixture();
        let member = MemberId::new();

        let sub = f
            .reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.expires_at, f.clock.now() + Duration::days(30));
        assert!(f.reconciler.has_access(member).await.unwrap());
        assert_eq!(f.reconciler.days_remaining(member).await.unwrap(), Some(30));
    }

    #[tokio::test]
    async fn resubscribing_reuses_the_existing_row() {
        let f = fixture();
        let member = MemberId::new();

        let first = f
            .reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        f.reconciler.suspend(member).await.unwrap();
        f.clock.advance(Duration::days(60));

        let second = f
            .reconciler
            .activate(member, f.plan.id, "sub_200")
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, SubscriptionStatus::Active);
        assert_eq!(second.external_ref.as_deref(), Some("sub_200"));
        assert_eq!(second.expires_at, f.clock.now() + Duration::days(30));
    }

    #[tokio::test]
    async fn replayed_activation_is_a_no_op() {
        let f = fixture();
        let member = MemberId::new();

        let first = f
            .reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        f.clock.advance(Duration::days(1));
        let second = f
            .reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        assert_eq!(second.expires_at, first.expires_at);
    }

    #[tokio::test]
    async fn extension_is_monotonic() {
        let f = fixture();
        let member = MemberId::new();
        let sub = f
            .reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();

        let later = sub.expires_at + Duration::days(30);
        let extended = f
            .reconciler
            .extend(member, "sub_100", Some(later))
            .await
            .unwrap();
        assert_eq!(extended.expires_at, later);

        // A stale notification dated before the stored expiration must
        // not shrink the paid-for period.
        let stale = f
            .reconciler
            .extend(member, "sub_100", Some(sub.expires_at))
            .await
            .unwrap();
        assert_eq!(stale.expires_at, later);
    }

    #[tokio::test]
    async fn extension_without_period_end_adds_a_cycle() {
        let f = fixture();
        let member = MemberId::new();
        let sub = f
            .reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();

        let extended = f.reconciler.extend(member, "sub_100", None).await.unwrap();
        assert_eq!(extended.expires_at, sub.expires_at + Duration::days(30));
    }

    #[tokio::test]
    async fn successful_renewal_clears_suspension() {
        let f = fixture();
        let member = MemberId::new();
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        f.reconciler.suspend(member).await.unwrap();

        let extended = f.reconciler.extend(member, "sub_100", None).await.unwrap();
        assert_eq!(extended.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn suspension_revokes_access_despite_future_expiration() {
        // Active with ten days left, then a failed renewal charge:
        // access must be gone immediately.
        let f = fixture();
        let member = MemberId::new();
        let sub = f
            .reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        f.clock.advance(Duration::days(20));
        assert!(sub.expires_at > f.clock.now());

        let suspended = f.reconciler.suspend(member).await.unwrap();
        assert_eq!(suspended.status, SubscriptionStatus::Suspended);
        assert!(suspended.expires_at > f.clock.now());
        assert!(!f.reconciler.has_access(member).await.unwrap());
    }

    #[tokio::test]
    async fn pending_cancellation_keeps_access_until_expiration() {
        let f = fixture();
        let member = MemberId::new();
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();

        f.reconciler.mark_pending_cancellation(member).await.unwrap();
        assert!(f.reconciler.has_access(member).await.unwrap());

        f.clock.advance(Duration::days(31));
        assert!(!f.reconciler.has_access(member).await.unwrap());
    }

    #[tokio::test]
    async fn reactivation_undoes_a_scheduled_cancellation() {
        let f = fixture();
        let member = MemberId::new();
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        f.reconciler.mark_pending_cancellation(member).await.unwrap();

        let reactivated = f.reconciler.reactivate(member).await.unwrap();
        assert_eq!(reactivated.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn reactivation_after_the_paid_period_is_refused() {
        let f = fixture();
        let member = MemberId::new();
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        f.reconciler.suspend(member).await.unwrap();
        f.clock.advance(Duration::days(31));

        let err = f.reconciler.reactivate(member).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn suspended_with_paid_period_left_can_reactivate() {
        let f = fixture();
        let member = MemberId::new();
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        f.reconciler.suspend(member).await.unwrap();
        f.clock.advance(Duration::days(5));

        let reactivated = f.reconciler.reactivate(member).await.unwrap();
        assert_eq!(reactivated.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn lifetime_grant_cancels_external_billing_first() {
        let f = fixture();
        let member = MemberId::new();
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();

        let granted = f.reconciler.grant_lifetime(member, None).await.unwrap();
        assert_eq!(granted.status, SubscriptionStatus::Active);
        assert!(granted.is_lifetime());
        assert!(granted.expires_at > f.clock.now() + Duration::days(36_000));
        assert_eq!(f.processor.cancelled_refs().unwrap(), vec!["sub_100"]);
    }

    #[tokio::test]
    async fn processor_failure_aborts_the_lifetime_grant() {
        let f = fixture();
        let member = MemberId::new();
        let before = f
            .reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        f.processor.set_failing(true);

        let err = f.reconciler.grant_lifetime(member, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Processor(_)));

        // Local state untouched: still externally billed.
        let after = f.ledger.find_subscription(member).await.unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn lifetime_grant_for_unsubscribed_member_needs_a_plan() {
        let f = fixture();
        let member = MemberId::new();

        let err = f.reconciler.grant_lifetime(member, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));

        let granted = f
            .reconciler
            .grant_lifetime(member, Some(f.plan.id))
            .await
            .unwrap();
        assert!(granted.is_lifetime());
        assert!(f.processor.cancelled_refs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn days_remaining_rounds_up() {
        let f = fixture();
        let member = MemberId::new();
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();

        f.clock.advance(Duration::days(29) + Duration::hours(1));
        assert_eq!(f.reconciler.days_remaining(member).await.unwrap(), Some(1));
        assert_eq!(f.reconciler.days_remaining(MemberId::new()).await.unwrap(), None);
    }
}
