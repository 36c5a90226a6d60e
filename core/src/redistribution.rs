//! Redistribution of a departing member's copies.
//!
//! Invoked exactly once as a precondition of member deletion, so
//! inventory is never orphaned. Recipients are picked round-robin from
//! the remaining membership; with nobody left to receive, copies stay
//! in the registry unassigned-but-flagged instead of pointing at a
//! purged member row.

use crate::clock::Clock;
use crate::error::Result;
use crate::store::{MemberStore, RegistryStore};
use crate::types::{AcquisitionMethod, MemberId};
use std::sync::Arc;

/// What redistribution did with the departing member's copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedistributionOutcome {
    /// Copies reassigned to other members.
    pub reassigned: usize,
    /// Copies left unassigned because no recipient existed.
    pub unassigned: usize,
}

impl RedistributionOutcome {
    /// Total copies the departing member no longer custodies.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.reassigned + self.unassigned
    }
}

/// Reassigns a departing member's copies.
#[derive(Clone)]
pub struct RedistributionEngine<R, M> {
    registry: R,
    members: M,
    clock: Arc<dyn Clock>,
}

impl<R, M> RedistributionEngine<R, M>
where
    R: RegistryStore,
    M: MemberStore,
{
    /// Wire the engine to its stores.
    pub fn new(registry: R, members: M, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            members,
            clock,
        }
    }

    /// Reassign every copy the member custodies. Each reassignment is
    /// atomic and appends a `Redistribution` ledger row; the caller
    /// must not purge the member row until this returns successfully.
    ///
    /// # Errors
    ///
    /// `Conflict` if a copy is still held by an active viewing session
    /// (the deletion flow detaches sessions first), `Store` on
    /// round-trip failure.
    pub async fn redistribute(&self, departing: MemberId) -> Result<RedistributionOutcome> {
        let entries = self.registry.entries_owned_by(departing).await?;
        if entries.is_empty() {
            return Ok(RedistributionOutcome::default());
        }

        let pool = self.members.list_members_except(departing).await?;
        let mut outcome = RedistributionOutcome::default();

        if pool.is_empty() {
            for entry in &entries {
                self.registry.mark_entry_unassigned(entry.id).await?;
                outcome.unassigned += 1;
            }
            tracing::warn!(
                departing = %departing,
                copies = outcome.unassigned,
                "no recipient available, copies left unassigned"
            );
            return Ok(outcome);
        }

        for (index, entry) in entries.iter().enumerate() {
            let recipient = pool[index % pool.len()];
            self.registry
                .transfer_entry(
                    entry.id,
                    recipient,
                    AcquisitionMethod::Redistribution,
                    self.clock.now(),
                )
                .await?;
            outcome.reassigned += 1;
        }

        tracing::info!(
            departing = %departing,
            copies = outcome.reassigned,
            recipients = pool.len(),
            "copies redistributed"
        );
        Ok(outcome)
    }
}
