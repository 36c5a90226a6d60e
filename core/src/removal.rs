//! Account removal workflow.
//!
//! Deleting a member is a destructive, multi-entity operation with a
//! fixed order: external billing is cancelled first (a processor
//! failure aborts everything), engagement rows are detached, copies
//! are redistributed, and only then are the member row and the auth
//! identity removed. The same workflow serves identities that exist
//! only in the auth layer with no profile row.

use crate::error::{CoreError, Result};
use crate::external::{IdentityDirectory, ProcessorClient};
use crate::redistribution::RedistributionEngine;
use crate::store::{MemberStore, RegistryStore, SubscriptionStore};
use crate::types::MemberId;

/// Summary of a completed removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalReport {
    /// Copies the departing member no longer custodies.
    pub redistributed: usize,
    /// Whether a profile row existed and was purged.
    pub had_profile: bool,
}

/// Orchestrates member deletion.
#[derive(Clone)]
pub struct AccountRemoval<M, R, S, X, I> {
    members: M,
    redistribution: RedistributionEngine<R, M>,
    subscriptions: S,
    processor: X,
    identity: I,
}

impl<M, R, S, X, I> AccountRemoval<M, R, S, X, I>
where
    M: MemberStore + Clone,
    R: RegistryStore,
    S: SubscriptionStore,
    X: ProcessorClient,
    I: IdentityDirectory,
{
    /// Wire the workflow to its collaborators.
    pub fn new(
        members: M,
        redistribution: RedistributionEngine<R, M>,
        subscriptions: S,
        processor: X,
        identity: I,
    ) -> Self {
        Self {
            members,
            redistribution,
            subscriptions,
            processor,
            identity,
        }
    }

    /// Delete a member and everything hanging off them.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such member, `Processor` if cancelling the
    /// external subscription fails (nothing is removed in that case),
    /// `Store` on round-trip failure.
    pub async fn remove_member(&self, member: MemberId) -> Result<RemovalReport> {
        self.members.get_member(member).await?;
        let report = self.cleanup(member, true).await?;
        tracing::info!(
            member_id = %member,
            redistributed = report.redistributed,
            "member removed"
        );
        Ok(report)
    }

    /// Clean up an identity that exists in the auth layer without a
    /// profile row. Runs the same detachment and redistribution so an
    /// inconsistent account can never orphan inventory either.
    ///
    /// # Errors
    ///
    /// `Processor` if cancelling a lingering external subscription
    /// fails, `Store` on round-trip failure.
    pub async fn remove_orphan_identity(&self, member: MemberId) -> Result<RemovalReport> {
        let report = self.cleanup(member, false).await?;
        tracing::info!(member_id = %member, "orphan identity removed");
        Ok(report)
    }

    async fn cleanup(&self, member: MemberId, require_profile: bool) -> Result<RemovalReport> {
        // Billing first; a processor failure aborts before anything
        // local is removed.
        if let Some(subscription) = self.subscriptions.find_subscription(member).await? {
            if let Some(external_ref) = subscription.external_ref.as_deref() {
                self.processor.cancel_subscription(external_ref).await?;
            }
        }

        self.members.detach_engagements(member).await?;
        self.subscriptions
            .delete_subscriptions_for_member(member)
            .await?;

        let outcome = self.redistribution.redistribute(member).await?;

        match self.members.delete_member(member).await {
            Ok(()) => {}
            Err(CoreError::NotFound { .. }) if !require_profile => {}
            Err(err) => return Err(err),
        }

        self.identity.delete_identity(member).await?;

        Ok(RemovalReport {
            redistributed: outcome.total(),
            had_profile: require_profile,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::{MemoryLedger, MockIdentityDirectory, MockProcessor};
    use crate::store::PaymentStore as _;
    use crate::types::{
        AcquisitionMethod, EntryId, Member, Plan, PlanId, RegistryEntry, Subscription,
        SubscriptionId, SubscriptionStatus, SupportKind, TitleId,
    };
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Arc;

    struct Fixture {
        removal: AccountRemoval<
            MemoryLedger,
            MemoryLedger,
            MemoryLedger,
            MockProcessor,
            MockIdentityDirectory,
        >,
        ledger: MemoryLedger,
        processor: MockProcessor,
        identity: MockIdentityDirectory,
    }

    fn fixture() -> Fixture {
        let ledger = MemoryLedger::new();
        let processor = MockProcessor::new();
        let identity = MockIdentityDirectory::new();
        let clock = FixedClock::at("2026-05-10T09:00:00Z".parse().unwrap());
        let redistribution =
            RedistributionEngine::new(ledger.clone(), ledger.clone(), Arc::new(clock));
        let removal = AccountRemoval::new(
            ledger.clone(),
            redistribution,
            ledger.clone(),
            processor.clone(),
            identity.clone(),
        );
        Fixture {
            removal,
            ledger,
            processor,
            identity,
        }
    }

    fn member_at(f: &Fixture, email: &str, at: DateTime<Utc>) -> MemberId {
        let member = Member {
            id: MemberId::new(),
            email: email.to_string(),
            display_name: email.split('@').next().unwrap_or(email).to_string(),
            is_admin: false,
            customer_ref: None,
            created_at: at,
        };
        let id = member.id;
        f.ledger.seed_member(member).unwrap();
        id
    }

    async fn entry_for(f: &Fixture, owner: MemberId) -> EntryId {
        let entry = RegistryEntry {
            id: EntryId::new(),
            title_id: TitleId::new(),
            support: SupportKind::Dvd,
            owner: Some(owner),
            method: AcquisitionMethod::Deposit,
            acquired_at: "2026-01-01T00:00:00Z".parse().unwrap(),
            available: true,
            notes: None,
        };
        let id = entry.id;
        f.ledger.insert_entry(&entry).await.unwrap();
        id
    }

    async fn subscribe(f: &Fixture, member: MemberId, external_ref: Option<&str>) {
        let plan = Plan {
            id: PlanId::new(),
            name: "Cinephile".to_string(),
            duration_days: 30,
            external_price_ref: "price_x".to_string(),
        };
        f.ledger.seed_plan(plan.clone()).unwrap();
        let started: DateTime<Utc> = "2026-05-01T00:00:00Z".parse().unwrap();
        let subscription = Subscription {
            id: SubscriptionId::new(),
            member_id: member,
            plan_id: plan.id,
            started_at: started,
            expires_at: started + Duration::days(30),
            status: SubscriptionStatus::Active,
            external_ref: external_ref.map(str::to_string),
        };
        f.ledger.insert_subscription(&subscription).await.unwrap();
    }

    #[tokio::test]
    async fn removal_redistributes_detaches_and_deletes() {
        let f = fixture();
        let t0: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let departing = member_at(&f, "leaving@example.org", t0);
        member_at(&f, "a@example.org", t0 + Duration::days(1));
        member_at(&f, "b@example.org", t0 + Duration::days(2));
        member_at(&f, "c@example.org", t0 + Duration::days(3));

        let first = entry_for(&f, departing).await;
        let second = entry_for(&f, departing).await;
        f.ledger.seed_like(departing, TitleId::new()).unwrap();
        f.ledger.begin_session(departing, first).unwrap();

        let report = f.removal.remove_member(departing).await.unwrap();
        assert_eq!(report.redistributed, 2);

        assert!(matches!(
            f.ledger.get_member(departing).await.unwrap_err(),
            CoreError::NotFound { .. }
        ));
        assert_eq!(f.ledger.like_count(departing).unwrap(), 0);
        assert_eq!(f.ledger.session_count(departing).unwrap(), 0);
        assert_eq!(f.identity.deleted_ids().unwrap(), vec![departing]);

        for id in [first, second] {
            let entry = f.ledger.get_entry(id).await.unwrap();
            assert_ne!(entry.owner, Some(departing));
            assert!(entry.owner.is_some());
            assert!(entry.available);
        }
    }

    #[tokio::test]
    async fn external_billing_is_cancelled_before_anything_else() {
        let f = fixture();
        let t0: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let departing = member_at(&f, "leaving@example.org", t0);
        subscribe(&f, departing, Some("sub_900")).await;

        f.removal.remove_member(departing).await.unwrap();
        assert_eq!(f.processor.cancelled_refs().unwrap(), vec!["sub_900"]);
        assert!(
            f.ledger
                .find_subscription(departing)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn processor_failure_aborts_the_removal() {
        let f = fixture();
        let t0: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let departing = member_at(&f, "leaving@example.org", t0);
        member_at(&f, "a@example.org", t0 + Duration::days(1));
        subscribe(&f, departing, Some("sub_900")).await;
        let entry = entry_for(&f, departing).await;
        f.processor.set_failing(true);

        let err = f.removal.remove_member(departing).await.unwrap_err();
        assert!(matches!(err, CoreError::Processor(_)));

        // Nothing was touched: member, subscription and copy remain.
        assert!(f.ledger.get_member(departing).await.is_ok());
        assert!(
            f.ledger
                .find_subscription(departing)
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(
            f.ledger.get_entry(entry).await.unwrap().owner,
            Some(departing)
        );
        assert!(f.identity.deleted_ids().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lifetime_members_skip_the_processor() {
        let f = fixture();
        let t0: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let departing = member_at(&f, "leaving@example.org", t0);
        subscribe(&f, departing, None).await;

        f.removal.remove_member(departing).await.unwrap();
        assert!(f.processor.cancelled_refs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_member_is_not_found() {
        let f = fixture();
        let err = f.removal.remove_member(MemberId::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn orphan_identity_cleanup_tolerates_the_missing_profile() {
        let f = fixture();
        let ghost = MemberId::new();

        let report = f.removal.remove_orphan_identity(ghost).await.unwrap();
        assert_eq!(report.redistributed, 0);
        assert!(!report.had_profile);
        assert_eq!(f.identity.deleted_ids().unwrap(), vec![ghost]);
    }

    #[tokio::test]
    async fn payment_history_survives_removal() {
        use crate::types::{PaymentId, PaymentKind, PaymentRecord, PaymentRecordStatus};

        let f = fixture();
        let t0: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let departing = member_at(&f, "leaving@example.org", t0);
        f.ledger
            .insert_payment_if_absent(&PaymentRecord {
                id: PaymentId::new(),
                member_id: departing,
                kind: PaymentKind::Subscription,
                external_ref: "in_1".to_string(),
                status: PaymentRecordStatus::Settled,
                amount_cents: 999,
                created_at: t0,
                settled_at: Some(t0),
            })
            .await
            .unwrap();

        f.removal.remove_member(departing).await.unwrap();
        assert!(
            f.ledger
                .find_payment_by_external_ref("in_1")
                .await
                .unwrap()
                .is_some()
        );
    }
}
