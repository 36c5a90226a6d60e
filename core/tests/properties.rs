//! Property tests for the core invariants.

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Duration, Utc};
use cinetheque_core::clock::FixedClock;
use cinetheque_core::memory::{MemoryLedger, MockProcessor};
use cinetheque_core::registry::OwnershipRegistry;
use cinetheque_core::store::{RegistryStore, SubscriptionStore};
use cinetheque_core::subscription::SubscriptionReconciler;
use cinetheque_core::types::{AcquisitionMethod, MemberId, Plan, PlanId, SupportKind, TitleId};
use proptest::prelude::*;
use std::sync::Arc;

fn epoch() -> DateTime<Utc> {
    "2026-05-10T09:00:00Z".parse().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// However renewals interleave, the stored expiration is the
    /// maximum of the initial expiration and every applied candidate:
    /// extension never regresses.
    #[test]
    fn extension_never_regresses(offsets in prop::collection::vec(-90i64..365, 1..12)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let ledger = MemoryLedger::new();
            let clock = FixedClock::at(epoch());
            let plan = Plan {
                id: PlanId::new(),
                name: "Cinephile".to_string(),
                duration_days: 30,
                external_price_ref: "price_x".to_string(),
            };
            ledger.seed_plan(plan.clone()).unwrap();
            let reconciler = SubscriptionReconciler::new(
                ledger.clone(),
                MockProcessor::new(),
                Arc::new(clock),
            );

            let member = MemberId::new();
            let initial = reconciler
                .activate(member, plan.id, "sub_1")
                .await
                .unwrap()
                .expires_at;

            let mut expected = initial;
            for offset in offsets {
                let candidate = initial + Duration::days(offset);
                let extended = reconciler
                    .extend(member, "sub_1", Some(candidate))
                    .await
                    .unwrap();
                expected = expected.max(candidate);
                prop_assert_eq!(extended.expires_at, expected);

                let stored = ledger.find_subscription(member).await.unwrap().unwrap();
                prop_assert!(stored.expires_at >= initial);
            }
            Ok(())
        })?;
    }

    /// After any sequence of custody transfers, the entry's owner is
    /// exactly the `to` of the most recent ledger row, and the ledger
    /// is strictly ordered by its monotonic id.
    #[test]
    fn owner_matches_latest_ledger_row(picks in prop::collection::vec(0usize..5, 0..16)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let ledger = MemoryLedger::new();
            let registry = OwnershipRegistry::new(
                ledger.clone(),
                Arc::new(FixedClock::at(epoch())),
            );

            let members: Vec<MemberId> = (0..5).map(|_| MemberId::new()).collect();
            let (entry, _) = registry
                .create_entry(
                    TitleId::new(),
                    members[0],
                    SupportKind::Dvd,
                    AcquisitionMethod::Deposit,
                    None,
                )
                .await
                .unwrap();

            for pick in picks {
                registry
                    .transfer(entry.id, members[pick], AcquisitionMethod::Exchange)
                    .await
                    .unwrap();
            }

            let current = ledger.get_entry(entry.id).await.unwrap();
            let history = registry.history(entry.id).await.unwrap();

            prop_assert_eq!(current.owner, history.last().map(|t| t.to));
            prop_assert!(history.windows(2).all(|w| w[0].id < w[1].id));
            for window in history.windows(2) {
                prop_assert_eq!(window[1].from, Some(window[0].to));
            }
            Ok(())
        })?;
    }
}
