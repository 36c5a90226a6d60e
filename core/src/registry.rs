//! Ownership registry and transfer ledger.
//!
//! The registry is the authoritative record of which member custodies
//! which physical copy; the ledger is the append-only history of how
//! custody moved. Every mutation that changes custody appends a ledger
//! row in the same transaction, so the most recent row's `to` always
//! equals the entry's current owner.

use crate::clock::Clock;
use crate::error::Result;
use crate::store::RegistryStore;
use crate::types::{
    AcquisitionMethod, EntryId, MemberId, OwnershipTransfer, RegistryEntry, SupportKind, TitleId,
};
use std::sync::Arc;

/// Public operations over the registry and its ledger.
#[derive(Clone)]
pub struct OwnershipRegistry<R> {
    registry: R,
    clock: Arc<dyn Clock>,
}

impl<R> OwnershipRegistry<R>
where
    R: RegistryStore,
{
    /// Wire the registry service to its store.
    pub fn new(registry: R, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// Admit a new copy into the registry with its initial ledger row
    /// (`from = None`). Used by deposit completion and admin manual
    /// creation.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    pub async fn create_entry(
        &self,
        title: TitleId,
        owner: MemberId,
        support: SupportKind,
        method: AcquisitionMethod,
        notes: Option<String>,
    ) -> Result<(RegistryEntry, OwnershipTransfer)> {
        let entry = RegistryEntry {
            id: EntryId::new(),
            title_id: title,
            support,
            owner: Some(owner),
            method,
            acquired_at: self.clock.now(),
            available: true,
            notes,
        };
        let transfer = self.registry.insert_entry(&entry).await?;

        tracing::info!(
            entry_id = %entry.id,
            owner_id = %owner,
            method = method.as_str(),
            "registry entry created"
        );
        Ok((entry, transfer))
    }

    /// Move custody of a copy to another member.
    ///
    /// # Errors
    ///
    /// `Conflict` if the copy is held by an active viewing session,
    /// `NotFound` if no such entry, `Store` on round-trip failure.
    pub async fn transfer(
        &self,
        entry: EntryId,
        to: MemberId,
        method: AcquisitionMethod,
    ) -> Result<OwnershipTransfer> {
        let transfer = self
            .registry
            .transfer_entry(entry, to, method, self.clock.now())
            .await?;

        tracing::info!(
            entry_id = %entry,
            to_owner = %to,
            method = method.as_str(),
            "custody transferred"
        );
        Ok(transfer)
    }

    /// Delete a copy and its entire custody history. Irreversible;
    /// callers must confirm explicitly before invoking this.
    ///
    /// Returns the number of cascaded ledger rows.
    ///
    /// # Errors
    ///
    /// `Conflict` if the copy is held by an active viewing session,
    /// `NotFound` if no such entry, `Store` on round-trip failure.
    pub async fn delete(&self, entry: EntryId) -> Result<u64> {
        let cascaded = self.registry.delete_entry(entry).await?;
        tracing::warn!(
            entry_id = %entry,
            cascaded_transfers = cascaded,
            "registry entry deleted with its history"
        );
        Ok(cascaded)
    }

    /// Full custody history of a copy, oldest first. Ties on the
    /// transfer timestamp break by the monotonic ledger id, so the
    /// order is a deterministic total order.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such entry, `Store` on round-trip failure.
    pub async fn history(&self, entry: EntryId) -> Result<Vec<OwnershipTransfer>> {
        self.registry.entry_history(entry).await
    }

    /// Grant a member streaming access to a single title, unless they
    /// already have it. Owning any copy of the title already implies
    /// access, and repeat grants insert nothing, so the operation is
    /// idempotent.
    ///
    /// Returns `true` only when a new grant was recorded.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    pub async fn grant_title_access(&self, member: MemberId, title: TitleId) -> Result<bool> {
        if self.registry.owns_title(member, title).await? {
            tracing::debug!(member_id = %member, title_id = %title, "member already owns title");
            return Ok(false);
        }

        let granted = self
            .registry
            .grant_title(member, title, self.clock.now())
            .await?;
        if granted {
            tracing::info!(member_id = %member, title_id = %title, "title access granted");
        }
        Ok(granted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::CoreError;
    use crate::memory::MemoryLedger;
    use chrono::Duration;

    fn service() -> (OwnershipRegistry<MemoryLedger>, MemoryLedger, FixedClock) {
        let ledger = MemoryLedger::new();
        let clock = FixedClock::at("2026-05-10T09:00:00Z".parse().unwrap());
        let service = OwnershipRegistry::new(ledger.clone(), Arc::new(clock.clone()));
        (service, ledger, clock)
    }

    #[tokio::test]
    async fn owner_always_matches_latest_ledger_row() {
        let (service, _, clock) = service();
        let (alice, bob, carol) = (MemberId::new(), MemberId::new(), MemberId::new());

        let (entry, _) = service
            .create_entry(
                TitleId::new(),
                alice,
                SupportKind::BluRay,
                AcquisitionMethod::Deposit,
                None,
            )
            .await
            .unwrap();

        clock.advance(Duration::hours(1));
        service
            .transfer(entry.id, bob, AcquisitionMethod::Exchange)
            .await
            .unwrap();
        clock.advance(Duration::hours(1));
        service
            .transfer(entry.id, carol, AcquisitionMethod::Sponsorship)
            .await
            .unwrap();

        let history = service.history(entry.id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].from, None);
        assert_eq!(history[0].to, alice);
        assert_eq!(history[1].from, Some(alice));
        assert_eq!(history[1].to, bob);
        assert_eq!(history[2].from, Some(bob));
        assert_eq!(history[2].to, carol);
    }

    #[tokio::test]
    async fn history_breaks_timestamp_ties_by_ledger_id() {
        // Two transfers at the same instant: insertion order decides.
        let (service, _, _) = service();
        let (alice, bob, carol) = (MemberId::new(), MemberId::new(), MemberId::new());

        let (entry, _) = service
            .create_entry(
                TitleId::new(),
                alice,
                SupportKind::Dvd,
                AcquisitionMethod::Deposit,
                None,
            )
            .await
            .unwrap();
        service
            .transfer(entry.id, bob, AcquisitionMethod::Exchange)
            .await
            .unwrap();
        service
            .transfer(entry.id, carol, AcquisitionMethod::Exchange)
            .await
            .unwrap();

        let history = service.history(entry.id).await.unwrap();
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(history[2].to, carol);
    }

    #[tokio::test]
    async fn in_session_copy_cannot_change_hands() {
        let (service, ledger, _) = service();
        let alice = MemberId::new();

        let (entry, _) = service
            .create_entry(
                TitleId::new(),
                alice,
                SupportKind::Dvd,
                AcquisitionMethod::Deposit,
                None,
            )
            .await
            .unwrap();
        ledger.begin_session(alice, entry.id).unwrap();

        let err = service
            .transfer(entry.id, MemberId::new(), AcquisitionMethod::Exchange)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));

        // State unchanged: still owned by alice, single ledger row.
        let after = ledger.get_entry(entry.id).await.unwrap();
        assert_eq!(after.owner, Some(alice));
        assert_eq!(service.history(entry.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn in_session_copy_cannot_be_deleted() {
        let (service, ledger, _) = service();
        let alice = MemberId::new();

        let (entry, _) = service
            .create_entry(
                TitleId::new(),
                alice,
                SupportKind::Vhs,
                AcquisitionMethod::Deposit,
                None,
            )
            .await
            .unwrap();
        ledger.begin_session(alice, entry.id).unwrap();

        let err = service.delete(entry.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
        assert!(ledger.get_entry(entry.id).await.is_ok());
    }

    #[tokio::test]
    async fn deletion_cascades_the_ledger() {
        let (service, ledger, _) = service();
        let alice = MemberId::new();

        let (entry, _) = service
            .create_entry(
                TitleId::new(),
                alice,
                SupportKind::UltraHd,
                AcquisitionMethod::Deposit,
                None,
            )
            .await
            .unwrap();
        service
            .transfer(entry.id, MemberId::new(), AcquisitionMethod::Exchange)
            .await
            .unwrap();

        let cascaded = service.delete(entry.id).await.unwrap();
        assert_eq!(cascaded, 2);
        assert_eq!(ledger.transfer_count().unwrap(), 0);
        assert!(matches!(
            service.history(entry.id).await.unwrap_err(),
            CoreError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn granting_title_access_is_idempotent() {
        let (service, ledger, _) = service();
        let member = MemberId::new();
        let title = TitleId::new();

        assert!(service.grant_title_access(member, title).await.unwrap());
        assert!(!service.grant_title_access(member, title).await.unwrap());
        assert!(ledger.has_title_grant(member, title).unwrap());
    }

    #[tokio::test]
    async fn owning_a_copy_already_implies_access() {
        let (service, ledger, _) = service();
        let member = MemberId::new();
        let title = TitleId::new();

        service
            .create_entry(title, member, SupportKind::Dvd, AcquisitionMethod::Deposit, None)
            .await
            .unwrap();

        assert!(!service.grant_title_access(member, title).await.unwrap());
        assert!(!ledger.has_title_grant(member, title).unwrap());
    }
}
