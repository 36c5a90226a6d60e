//! Deposit intake workflow.
//!
//! A deposit starts life when a member declares a shipment and moves
//! strictly forward under admin control: `sent → received →
//! (digitizing) → completed`, with rejection as the only other terminal
//! state. Completion admits the disc into the registry: the status
//! flip, the registry entry and the initial custody ledger row commit
//! in a single store transaction.

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::external::CatalogResolver;
use crate::store::DepositStore;
use crate::types::{
    AcquisitionMethod, Deposit, DepositId, DepositStatus, EntryId, MemberId, RegistryEntry,
    SupportKind, TitleId,
};
use std::sync::Arc;

/// A member's declaration of an inbound shipment.
#[derive(Debug, Clone)]
pub struct DepositDeclaration {
    /// Film title as written by the member.
    pub declared_title: String,
    /// Declared physical support.
    pub support: SupportKind,
    /// Optional hint for catalog matching.
    pub catalog_hint: Option<String>,
    /// Carrier tracking code.
    pub tracking_code: String,
}

/// Drives the deposit state machine.
#[derive(Clone)]
pub struct DepositEngine<D, C> {
    deposits: D,
    catalog: C,
    clock: Arc<dyn Clock>,
}

impl<D, C> DepositEngine<D, C>
where
    D: DepositStore,
    C: CatalogResolver,
{
    /// Wire the engine to its store and catalog collaborator.
    pub fn new(deposits: D, catalog: C, clock: Arc<dyn Clock>) -> Self {
        Self {
            deposits,
            catalog,
            clock,
        }
    }

    /// Member-facing intake declaration. The new deposit starts in
    /// `Sent`.
    ///
    /// # Errors
    ///
    /// `Validation` on a blank title or tracking code, `Store` on
    /// round-trip failure.
    pub async fn declare(
        &self,
        member: MemberId,
        declaration: DepositDeclaration,
    ) -> Result<Deposit> {
        if declaration.declared_title.trim().is_empty() {
            return Err(CoreError::validation("declared title must not be blank"));
        }
        if declaration.tracking_code.trim().is_empty() {
            return Err(CoreError::validation("tracking code must not be blank"));
        }

        let now = self.clock.now();
        let deposit = Deposit {
            id: DepositId::new(),
            member_id: member,
            declared_title: declaration.declared_title,
            support: declaration.support,
            catalog_hint: declaration.catalog_hint,
            tracking_code: declaration.tracking_code,
            status: DepositStatus::Sent,
            rejection_reason: None,
            entry_id: None,
            created_at: now,
            updated_at: now,
        };
        self.deposits.insert_deposit(&deposit).await?;

        tracing::info!(
            deposit_id = %deposit.id,
            member_id = %member,
            "deposit declared"
        );
        Ok(deposit)
    }

    /// Deposits declared by a member, newest first.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    pub async fn for_member(&self, member: MemberId) -> Result<Vec<Deposit>> {
        self.deposits.deposits_for_member(member).await
    }

    /// Deposits waiting in a given workflow state, oldest first.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    pub async fn in_status(&self, status: DepositStatus) -> Result<Vec<Deposit>> {
        self.deposits.deposits_in_status(status).await
    }

    /// Admin confirms physical receipt of the disc.
    ///
    /// # Errors
    ///
    /// `Conflict` unless the deposit is in `Sent`, `NotFound` if no
    /// such deposit, `Store` on round-trip failure.
    pub async fn receive(&self, id: DepositId) -> Result<Deposit> {
        let deposit = self
            .deposits
            .advance_deposit(
                id,
                DepositStatus::Sent,
                DepositStatus::Received,
                None,
                self.clock.now(),
            )
            .await?;
        tracing::info!(deposit_id = %id, "deposit received");
        Ok(deposit)
    }

    /// Admin sends the disc to digitization.
    ///
    /// # Errors
    ///
    /// `Conflict` unless the deposit is in `Received`, `NotFound` if no
    /// such deposit, `Store` on round-trip failure.
    pub async fn start_digitizing(&self, id: DepositId) -> Result<Deposit> {
        let deposit = self
            .deposits
            .advance_deposit(
                id,
                DepositStatus::Received,
                DepositStatus::Digitizing,
                None,
                self.clock.now(),
            )
            .await?;
        tracing::info!(deposit_id = %id, "deposit digitizing");
        Ok(deposit)
    }

    /// Admin refuses the deposit. Terminal; no registry side effects.
    ///
    /// # Errors
    ///
    /// `Validation` on a blank reason, `Conflict` unless the deposit is
    /// in `Sent` or `Received`, `NotFound` if no such deposit, `Store`
    /// on round-trip failure.
    pub async fn reject(&self, id: DepositId, reason: &str) -> Result<Deposit> {
        if reason.trim().is_empty() {
            return Err(CoreError::validation("rejection reason must not be blank"));
        }

        let current = self.deposits.get_deposit(id).await?;
        if !matches!(current.status, DepositStatus::Sent | DepositStatus::Received) {
            return Err(CoreError::conflict(format!(
                "deposit is {}, cannot reject",
                current.status.as_str()
            )));
        }

        let deposit = self
            .deposits
            .advance_deposit(
                id,
                current.status,
                DepositStatus::Rejected,
                Some(reason.trim()),
                self.clock.now(),
            )
            .await?;
        tracing::info!(deposit_id = %id, reason, "deposit rejected");
        Ok(deposit)
    }

    /// Admin matches the received disc to a catalog title and admits it
    /// into the registry.
    ///
    /// Creates exactly one registry entry owned by the depositing
    /// member and one initial ledger row, atomically with the status
    /// flip: if anything fails, neither the deposit nor the registry
    /// changes.
    ///
    /// # Errors
    ///
    /// `Validation` if the catalog title does not resolve, `Conflict`
    /// unless the deposit is in `Received` or `Digitizing`, `NotFound`
    /// if no such deposit, `Store` on round-trip failure.
    pub async fn complete(
        &self,
        id: DepositId,
        title: TitleId,
    ) -> Result<(Deposit, EntryId)> {
        let current = self.deposits.get_deposit(id).await?;

        let resolved = match self.catalog.resolve_title(title).await {
            Ok(resolved) => resolved,
            Err(CoreError::NotFound { .. }) => {
                return Err(CoreError::validation(format!(
                    "catalog title {title} does not resolve"
                )));
            }
            Err(other) => return Err(other),
        };

        let entry = RegistryEntry {
            id: EntryId::new(),
            title_id: resolved.id,
            support: current.support,
            owner: Some(current.member_id),
            method: AcquisitionMethod::Deposit,
            acquired_at: self.clock.now(),
            available: true,
            notes: None,
        };

        let deposit = self
            .deposits
            .complete_deposit(id, &entry, self.clock.now())
            .await?;

        tracing::info!(
            deposit_id = %id,
            entry_id = %entry.id,
            title = %resolved.name,
            "deposit completed"
        );
        Ok((deposit, entry.id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::{MemoryLedger, MockCatalog};
    use crate::store::RegistryStore;

    fn engine() -> (DepositEngine<MemoryLedger, MockCatalog>, MemoryLedger, MockCatalog) {
        let ledger = MemoryLedger::new();
        let catalog = MockCatalog::new();
        let clock = FixedClock::at("2026-05-10T09:00:00Z".parse().unwrap());
        let engine = DepositEngine::new(ledger.clone(), catalog.clone(), Arc::new(clock));
        (engine, ledger, catalog)
    }

    fn declaration() -> DepositDeclaration {
        DepositDeclaration {
            declared_title: "La Jetée".to_string(),
            support: SupportKind::Dvd,
            catalog_hint: Some("Marker, 1962".to_string()),
            tracking_code: "COLIS-774".to_string(),
        }
    }

    #[tokio::test]
    async fn declaration_starts_in_sent() {
        let (engine, _, _) = engine();
        let deposit = engine.declare(MemberId::new(), declaration()).await.unwrap();
        assert_eq!(deposit.status, DepositStatus::Sent);
        assert!(deposit.entry_id.is_none());
    }

    #[tokio::test]
    async fn blank_tracking_code_is_rejected() {
        let (engine, _, _) = engine();
        let mut decl = declaration();
        decl.tracking_code = "  ".to_string();
        let err = engine.declare(MemberId::new(), decl).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn failed_completion_leaves_everything_untouched() {
        // Receive, then complete with an unresolvable catalog id: the
        // status must stay Received and no registry entry may appear.
        let (engine, ledger, _) = engine();
        let deposit = engine.declare(MemberId::new(), declaration()).await.unwrap();
        engine.receive(deposit.id).await.unwrap();

        let err = engine
            .complete(deposit.id, TitleId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));

        let after = ledger.get_deposit(deposit.id).await.unwrap();
        assert_eq!(after.status, DepositStatus::Received);
        assert!(after.entry_id.is_none());
        assert_eq!(ledger.count_entries().await.unwrap(), 0);
        assert_eq!(ledger.transfer_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn completion_creates_entry_and_initial_ledger_row() {
        let (engine, ledger, catalog) = engine();
        let member = MemberId::new();
        let title = TitleId::new();
        catalog.seed_title(title, "La Jetée").unwrap();

        let deposit = engine.declare(member, declaration()).await.unwrap();
        engine.receive(deposit.id).await.unwrap();
        let (completed, entry_id) = engine.complete(deposit.id, title).await.unwrap();

        assert_eq!(completed.status, DepositStatus::Completed);
        assert_eq!(completed.entry_id, Some(entry_id));

        let entry = ledger.get_entry(entry_id).await.unwrap();
        assert_eq!(entry.owner, Some(member));
        assert_eq!(entry.method, AcquisitionMethod::Deposit);
        assert_eq!(entry.support, SupportKind::Dvd);

        let history = ledger.entry_history(entry_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from, None);
        assert_eq!(history[0].to, member);
        assert_eq!(history[0].method, AcquisitionMethod::Deposit);
    }

    #[tokio::test]
    async fn completion_is_legal_from_digitizing() {
        let (engine, _, catalog) = engine();
        let title = TitleId::new();
        catalog.seed_title(title, "Sans Soleil").unwrap();

        let deposit = engine.declare(MemberId::new(), declaration()).await.unwrap();
        engine.receive(deposit.id).await.unwrap();
        engine.start_digitizing(deposit.id).await.unwrap();
        let (completed, _) = engine.complete(deposit.id, title).await.unwrap();
        assert_eq!(completed.status, DepositStatus::Completed);
    }

    #[tokio::test]
    async fn completing_a_sent_deposit_is_a_conflict() {
        let (engine, _, catalog) = engine();
        let title = TitleId::new();
        catalog.seed_title(title, "Level Five").unwrap();

        let deposit = engine.declare(MemberId::new(), declaration()).await.unwrap();
        let err = engine.complete(deposit.id, title).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn rejection_requires_a_reason() {
        let (engine, _, _) = engine();
        let deposit = engine.declare(MemberId::new(), declaration()).await.unwrap();

        let err = engine.reject(deposit.id, "   ").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));

        let rejected = engine.reject(deposit.id, "disc arrived cracked").await.unwrap();
        assert_eq!(rejected.status, DepositStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("disc arrived cracked")
        );
    }

    #[tokio::test]
    async fn rejection_is_terminal() {
        let (engine, _, _) = engine();
        let deposit = engine.declare(MemberId::new(), declaration()).await.unwrap();
        engine.reject(deposit.id, "unreadable").await.unwrap();

        let err = engine.receive(deposit.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));

        let err = engine.reject(deposit.id, "again").await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn digitizing_deposits_cannot_be_rejected() {
        let (engine, _, _) = engine();
        let deposit = engine.declare(MemberId::new(), declaration()).await.unwrap();
        engine.receive(deposit.id).await.unwrap();
        engine.start_digitizing(deposit.id).await.unwrap();

        let err = engine.reject(deposit.id, "too late").await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict { .. }));
    }
}
