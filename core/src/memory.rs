//! In-memory ledger and collaborator mocks.
//!
//! One mutex-guarded state block implements every store trait, so the
//! composite operations are atomic the same way the relational store's
//! transactions are. Used by unit tests and local development.

use crate::error::{CoreError, Result};
use crate::external::{CatalogResolver, IdentityDirectory, ProcessorClient};
use crate::store::{DepositStore, MemberStore, PaymentStore, RegistryStore, SubscriptionStore};
use crate::types::{
    AcquisitionMethod, CatalogTitle, Deposit, DepositId, DepositStatus, EntryId, Member, MemberId,
    OwnershipTransfer, PaymentRecord, PaymentRecordStatus, Plan, PlanId, RegistryEntry,
    Subscription, SubscriptionId, TitleId,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory implementation of the whole ledger store.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

#[derive(Default)]
struct LedgerInner {
    members: HashMap<MemberId, Member>,
    entries: HashMap<EntryId, RegistryEntry>,
    transfers: Vec<OwnershipTransfer>,
    next_transfer_id: i64,
    deposits: HashMap<DepositId, Deposit>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    plans: HashMap<PlanId, Plan>,
    payments: HashMap<String, PaymentRecord>,
    title_grants: HashSet<(MemberId, TitleId)>,
    likes: HashMap<MemberId, HashSet<TitleId>>,
    sessions: Vec<ViewingSession>,
    sponsorships: Vec<(MemberId, MemberId)>,
}

#[derive(Clone, Copy)]
struct ViewingSession {
    member: MemberId,
    entry: EntryId,
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerInner>> {
        self.inner
            .lock()
            .map_err(|_| CoreError::store("ledger mutex poisoned"))
    }

    fn append_transfer(
        inner: &mut LedgerInner,
        entry_id: EntryId,
        from: Option<MemberId>,
        to: MemberId,
        method: AcquisitionMethod,
        at: DateTime<Utc>,
    ) -> OwnershipTransfer {
        inner.next_transfer_id += 1;
        let transfer = OwnershipTransfer {
            id: inner.next_transfer_id,
            entry_id,
            from,
            to,
            method,
            occurred_at: at,
        };
        inner.transfers.push(transfer.clone());
        transfer
    }

    // ── test fixtures ──────────────────────────────────────────────

    /// Seed a member row.
    ///
    /// # Errors
    ///
    /// `Store` if the ledger mutex is poisoned.
    pub fn seed_member(&self, member: Member) -> Result<()> {
        self.lock()?.members.insert(member.id, member);
        Ok(())
    }

    /// Seed a plan row.
    ///
    /// # Errors
    ///
    /// `Store` if the ledger mutex is poisoned.
    pub fn seed_plan(&self, plan: Plan) -> Result<()> {
        self.lock()?.plans.insert(plan.id, plan);
        Ok(())
    }

    /// Record a like, simulating engagement data.
    ///
    /// # Errors
    ///
    /// `Store` if the ledger mutex is poisoned.
    pub fn seed_like(&self, member: MemberId, title: TitleId) -> Result<()> {
        self.lock()?.likes.entry(member).or_default().insert(title);
        Ok(())
    }

    /// Link two members through sponsorship.
    ///
    /// # Errors
    ///
    /// `Store` if the ledger mutex is poisoned.
    pub fn seed_sponsorship(&self, sponsor: MemberId, sponsee: MemberId) -> Result<()> {
        self.lock()?.sponsorships.push((sponsor, sponsee));
        Ok(())
    }

    /// Start a viewing session on an entry, making it unavailable.
    ///
    /// # Errors
    ///
    /// `NotFound` if the entry does not exist, `Store` if the ledger
    /// mutex is poisoned.
    pub fn begin_session(&self, member: MemberId, entry: EntryId) -> Result<()> {
        let mut inner = self.lock()?;
        let record = inner
            .entries
            .get_mut(&entry)
            .ok_or(CoreError::not_found("RegistryEntry"))?;
        record.available = false;
        inner.sessions.push(ViewingSession { member, entry });
        Ok(())
    }

    /// Number of active viewing sessions held by a member.
    ///
    /// # Errors
    ///
    /// `Store` if the ledger mutex is poisoned.
    pub fn session_count(&self, member: MemberId) -> Result<usize> {
        Ok(self
            .lock()?
            .sessions
            .iter()
            .filter(|s| s.member == member)
            .count())
    }

    /// Number of likes recorded for a member.
    ///
    /// # Errors
    ///
    /// `Store` if the ledger mutex is poisoned.
    pub fn like_count(&self, member: MemberId) -> Result<usize> {
        Ok(self.lock()?.likes.get(&member).map_or(0, HashSet::len))
    }

    /// Total ledger rows across all entries.
    ///
    /// # Errors
    ///
    /// `Store` if the ledger mutex is poisoned.
    pub fn transfer_count(&self) -> Result<usize> {
        Ok(self.lock()?.transfers.len())
    }

    /// Whether a (member, title) streaming grant exists.
    ///
    /// # Errors
    ///
    /// `Store` if the ledger mutex is poisoned.
    pub fn has_title_grant(&self, member: MemberId, title: TitleId) -> Result<bool> {
        Ok(self.lock()?.title_grants.contains(&(member, title)))
    }
}

impl MemberStore for MemoryLedger {
    async fn get_member(&self, id: MemberId) -> Result<Member> {
        self.lock()?
            .members
            .get(&id)
            .cloned()
            .ok_or(CoreError::not_found("Member"))
    }

    async fn find_member_by_customer_ref(&self, customer_ref: &str) -> Result<Option<Member>> {
        Ok(self
            .lock()?
            .members
            .values()
            .find(|m| m.customer_ref.as_deref() == Some(customer_ref))
            .cloned())
    }

    async fn insert_member(&self, member: &Member) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.members.values().any(|m| m.email == member.email) {
            return Err(CoreError::conflict("email already registered"));
        }
        inner.members.insert(member.id, member.clone());
        Ok(())
    }

    async fn set_customer_ref(&self, id: MemberId, customer_ref: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let member = inner
            .members
            .get_mut(&id)
            .ok_or(CoreError::not_found("Member"))?;
        member.customer_ref = Some(customer_ref.to_string());
        Ok(())
    }

    async fn list_members_except(&self, excluded: MemberId) -> Result<Vec<MemberId>> {
        let inner = self.lock()?;
        let mut members: Vec<&Member> = inner
            .members
            .values()
            .filter(|m| m.id != excluded)
            .collect();
        members.sort_by_key(|m| (m.created_at, m.id.0));
        Ok(members.into_iter().map(|m| m.id).collect())
    }

    async fn detach_engagements(&self, id: MemberId) -> Result<()> {
        let mut inner = self.lock()?;
        inner.likes.remove(&id);
        inner.sponsorships.retain(|(a, b)| *a != id && *b != id);

        let held: Vec<EntryId> = inner
            .sessions
            .iter()
            .filter(|s| s.member == id)
            .map(|s| s.entry)
            .collect();
        inner.sessions.retain(|s| s.member != id);
        for entry_id in held {
            if let Some(entry) = inner.entries.get_mut(&entry_id) {
                entry.available = true;
            }
        }
        Ok(())
    }

    async fn delete_member(&self, id: MemberId) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.members.contains_key(&id) {
            return Err(CoreError::not_found("Member"));
        }
        if inner.entries.values().any(|e| e.owner == Some(id)) {
            return Err(CoreError::conflict(
                "member still custodies registry entries",
            ));
        }
        inner.members.remove(&id);
        Ok(())
    }
}

impl RegistryStore for MemoryLedger {
    async fn get_entry(&self, id: EntryId) -> Result<RegistryEntry> {
        self.lock()?
            .entries
            .get(&id)
            .cloned()
            .ok_or(CoreError::not_found("RegistryEntry"))
    }

    async fn insert_entry(&self, entry: &RegistryEntry) -> Result<OwnershipTransfer> {
        let owner = entry
            .owner
            .ok_or_else(|| CoreError::validation("new registry entries require an owner"))?;
        let mut inner = self.lock()?;
        inner.entries.insert(entry.id, entry.clone());
        Ok(Self::append_transfer(
            &mut inner,
            entry.id,
            None,
            owner,
            entry.method,
            entry.acquired_at,
        ))
    }

    async fn transfer_entry(
        &self,
        id: EntryId,
        to: MemberId,
        method: AcquisitionMethod,
        at: DateTime<Utc>,
    ) -> Result<OwnershipTransfer> {
        let mut inner = self.lock()?;
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or(CoreError::not_found("RegistryEntry"))?;
        if !entry.available {
            return Err(CoreError::conflict(
                "copy is held by an active viewing session",
            ));
        }
        let from = entry.owner;
        entry.owner = Some(to);
        entry.method = method;
        entry.acquired_at = at;
        Ok(Self::append_transfer(&mut inner, id, from, to, method, at))
    }

    async fn mark_entry_unassigned(&self, id: EntryId) -> Result<()> {
        let mut inner = self.lock()?;
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or(CoreError::not_found("RegistryEntry"))?;
        entry.owner = None;
        Ok(())
    }

    async fn delete_entry(&self, id: EntryId) -> Result<u64> {
        let mut inner = self.lock()?;
        let entry = inner
            .entries
            .get(&id)
            .ok_or(CoreError::not_found("RegistryEntry"))?;
        if !entry.available {
            return Err(CoreError::conflict(
                "copy is held by an active viewing session",
            ));
        }
        inner.entries.remove(&id);
        let before = inner.transfers.len();
        inner.transfers.retain(|t| t.entry_id != id);
        Ok((before - inner.transfers.len()) as u64)
    }

    async fn entry_history(&self, id: EntryId) -> Result<Vec<OwnershipTransfer>> {
        let inner = self.lock()?;
        if !inner.entries.contains_key(&id) {
            return Err(CoreError::not_found("RegistryEntry"));
        }
        let mut rows: Vec<OwnershipTransfer> = inner
            .transfers
            .iter()
            .filter(|t| t.entry_id == id)
            .cloned()
            .collect();
        rows.sort_by_key(|t| (t.occurred_at, t.id));
        Ok(rows)
    }

    async fn entries_owned_by(&self, member: MemberId) -> Result<Vec<RegistryEntry>> {
        let inner = self.lock()?;
        let mut entries: Vec<RegistryEntry> = inner
            .entries
            .values()
            .filter(|e| e.owner == Some(member))
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.acquired_at, e.id.0));
        Ok(entries)
    }

    async fn owns_title(&self, member: MemberId, title: TitleId) -> Result<bool> {
        Ok(self
            .lock()?
            .entries
            .values()
            .any(|e| e.owner == Some(member) && e.title_id == title))
    }

    async fn set_entry_available(&self, id: EntryId, available: bool) -> Result<()> {
        let mut inner = self.lock()?;
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or(CoreError::not_found("RegistryEntry"))?;
        entry.available = available;
        Ok(())
    }

    async fn grant_title(&self, member: MemberId, title: TitleId, _at: DateTime<Utc>) -> Result<bool> {
        Ok(self.lock()?.title_grants.insert((member, title)))
    }

    async fn count_entries(&self) -> Result<u64> {
        Ok(self.lock()?.entries.len() as u64)
    }
}

impl DepositStore for MemoryLedger {
    async fn get_deposit(&self, id: DepositId) -> Result<Deposit> {
        self.lock()?
            .deposits
            .get(&id)
            .cloned()
            .ok_or(CoreError::not_found("Deposit"))
    }

    async fn insert_deposit(&self, deposit: &Deposit) -> Result<()> {
        self.lock()?.deposits.insert(deposit.id, deposit.clone());
        Ok(())
    }

    async fn deposits_for_member(&self, member: MemberId) -> Result<Vec<Deposit>> {
        let inner = self.lock()?;
        let mut deposits: Vec<Deposit> = inner
            .deposits
            .values()
            .filter(|d| d.member_id == member)
            .cloned()
            .collect();
        deposits.sort_by_key(|d| std::cmp::Reverse(d.created_at));
        Ok(deposits)
    }

    async fn deposits_in_status(&self, status: DepositStatus) -> Result<Vec<Deposit>> {
        let inner = self.lock()?;
        let mut deposits: Vec<Deposit> = inner
            .deposits
            .values()
            .filter(|d| d.status == status)
            .cloned()
            .collect();
        deposits.sort_by_key(|d| d.created_at);
        Ok(deposits)
    }

    async fn advance_deposit(
        &self,
        id: DepositId,
        from: DepositStatus,
        to: DepositStatus,
        rejection_reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Deposit> {
        let mut inner = self.lock()?;
        let deposit = inner
            .deposits
            .get_mut(&id)
            .ok_or(CoreError::not_found("Deposit"))?;
        if deposit.status != from {
            return Err(CoreError::conflict(format!(
                "deposit is {}, expected {}",
                deposit.status.as_str(),
                from.as_str()
            )));
        }
        deposit.status = to;
        deposit.rejection_reason = rejection_reason.map(str::to_string);
        deposit.updated_at = at;
        Ok(deposit.clone())
    }

    async fn complete_deposit(
        &self,
        id: DepositId,
        entry: &RegistryEntry,
        at: DateTime<Utc>,
    ) -> Result<Deposit> {
        let owner = entry
            .owner
            .ok_or_else(|| CoreError::validation("new registry entries require an owner"))?;
        let mut inner = self.lock()?;
        let deposit = inner
            .deposits
            .get(&id)
            .ok_or(CoreError::not_found("Deposit"))?;
        if !matches!(
            deposit.status,
            DepositStatus::Received | DepositStatus::Digitizing
        ) {
            return Err(CoreError::conflict(format!(
                "deposit is {}, cannot complete",
                deposit.status.as_str()
            )));
        }

        inner.entries.insert(entry.id, entry.clone());
        Self::append_transfer(&mut inner, entry.id, None, owner, entry.method, at);

        let deposit = inner
            .deposits
            .get_mut(&id)
            .ok_or(CoreError::not_found("Deposit"))?;
        deposit.status = DepositStatus::Completed;
        deposit.entry_id = Some(entry.id);
        deposit.updated_at = at;
        Ok(deposit.clone())
    }
}

impl SubscriptionStore for MemoryLedger {
    async fn find_subscription(&self, member: MemberId) -> Result<Option<Subscription>> {
        Ok(self
            .lock()?
            .subscriptions
            .values()
            .find(|s| s.member_id == member)
            .cloned())
    }

    async fn find_subscription_for_plan(
        &self,
        member: MemberId,
        plan: PlanId,
    ) -> Result<Option<Subscription>> {
        Ok(self
            .lock()?
            .subscriptions
            .values()
            .find(|s| s.member_id == member && s.plan_id == plan)
            .cloned())
    }

    async fn find_subscription_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Subscription>> {
        Ok(self
            .lock()?
            .subscriptions
            .values()
            .find(|s| s.external_ref.as_deref() == Some(external_ref))
            .cloned())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.lock()?
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut inner = self.lock()?;
        if !inner.subscriptions.contains_key(&subscription.id) {
            return Err(CoreError::not_found("Subscription"));
        }
        inner
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn extend_subscription(
        &self,
        id: SubscriptionId,
        candidate: DateTime<Utc>,
    ) -> Result<Subscription> {
        let mut inner = self.lock()?;
        let subscription = inner
            .subscriptions
            .get_mut(&id)
            .ok_or(CoreError::not_found("Subscription"))?;
        subscription.expires_at = subscription.expires_at.max(candidate);
        Ok(subscription.clone())
    }

    async fn delete_subscriptions_for_member(&self, member: MemberId) -> Result<()> {
        self.lock()?
            .subscriptions
            .retain(|_, s| s.member_id != member);
        Ok(())
    }

    async fn get_plan(&self, id: PlanId) -> Result<Plan> {
        self.lock()?
            .plans
            .get(&id)
            .cloned()
            .ok_or(CoreError::not_found("Plan"))
    }

    async fn find_plan_by_price_ref(&self, price_ref: &str) -> Result<Option<Plan>> {
        Ok(self
            .lock()?
            .plans
            .values()
            .find(|p| p.external_price_ref == price_ref)
            .cloned())
    }

    async fn insert_plan(&self, plan: &Plan) -> Result<()> {
        self.lock()?.plans.insert(plan.id, plan.clone());
        Ok(())
    }
}

impl PaymentStore for MemoryLedger {
    async fn insert_payment_if_absent(&self, payment: &PaymentRecord) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.payments.contains_key(&payment.external_ref) {
            return Ok(false);
        }
        inner
            .payments
            .insert(payment.external_ref.clone(), payment.clone());
        Ok(true)
    }

    async fn find_payment_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<PaymentRecord>> {
        Ok(self.lock()?.payments.get(external_ref).cloned())
    }

    async fn settle_payment(
        &self,
        external_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<(PaymentRecord, bool)> {
        let mut inner = self.lock()?;
        let payment = inner
            .payments
            .get_mut(external_ref)
            .ok_or(CoreError::not_found("PaymentRecord"))?;
        if payment.status == PaymentRecordStatus::Settled {
            return Ok((payment.clone(), false));
        }
        payment.status = PaymentRecordStatus::Settled;
        payment.settled_at = Some(at);
        Ok((payment.clone(), true))
    }

    async fn fail_payment(&self, external_ref: &str) -> Result<PaymentRecord> {
        let mut inner = self.lock()?;
        let payment = inner
            .payments
            .get_mut(external_ref)
            .ok_or(CoreError::not_found("PaymentRecord"))?;
        payment.status = PaymentRecordStatus::Failed;
        Ok(payment.clone())
    }
}

/// Catalog resolver backed by a seeded map.
#[derive(Clone, Default)]
pub struct MockCatalog {
    titles: Arc<Mutex<HashMap<TitleId, String>>>,
}

impl MockCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a resolvable title.
    ///
    /// # Errors
    ///
    /// `Store` if the catalog mutex is poisoned.
    pub fn seed_title(&self, id: TitleId, name: impl Into<String>) -> Result<()> {
        self.titles
            .lock()
            .map_err(|_| CoreError::store("catalog mutex poisoned"))?
            .insert(id, name.into());
        Ok(())
    }
}

impl CatalogResolver for MockCatalog {
    async fn resolve_title(&self, id: TitleId) -> Result<CatalogTitle> {
        self.titles
            .lock()
            .map_err(|_| CoreError::store("catalog mutex poisoned"))?
            .get(&id)
            .map(|name| CatalogTitle {
                id,
                name: name.clone(),
            })
            .ok_or(CoreError::not_found("CatalogTitle"))
    }
}

/// Processor client that records outbound calls and can be told to
/// fail.
#[derive(Clone, Default)]
pub struct MockProcessor {
    cancelled: Arc<Mutex<Vec<String>>>,
    scheduled: Arc<Mutex<Vec<String>>>,
    resumed: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl MockProcessor {
    /// Create a processor mock that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail with a processor error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CoreError::Processor("simulated processor outage".into()));
        }
        Ok(())
    }

    /// External references cancelled immediately so far.
    ///
    /// # Errors
    ///
    /// `Store` if the mutex is poisoned.
    pub fn cancelled_refs(&self) -> Result<Vec<String>> {
        Ok(self
            .cancelled
            .lock()
            .map_err(|_| CoreError::store("processor mutex poisoned"))?
            .clone())
    }

    /// External references with a cancellation scheduled so far.
    ///
    /// # Errors
    ///
    /// `Store` if the mutex is poisoned.
    pub fn scheduled_refs(&self) -> Result<Vec<String>> {
        Ok(self
            .scheduled
            .lock()
            .map_err(|_| CoreError::store("processor mutex poisoned"))?
            .clone())
    }

    /// External references resumed so far.
    ///
    /// # Errors
    ///
    /// `Store` if the mutex is poisoned.
    pub fn resumed_refs(&self) -> Result<Vec<String>> {
        Ok(self
            .resumed
            .lock()
            .map_err(|_| CoreError::store("processor mutex poisoned"))?
            .clone())
    }
}

impl ProcessorClient for MockProcessor {
    async fn create_checkout(&self, member: MemberId, plan: &Plan) -> Result<String> {
        self.guard()?;
        Ok(format!(
            "https://checkout.processor.test/{}/{}",
            member, plan.external_price_ref
        ))
    }

    async fn cancel_subscription(&self, external_ref: &str) -> Result<()> {
        self.guard()?;
        self.cancelled
            .lock()
            .map_err(|_| CoreError::store("processor mutex poisoned"))?
            .push(external_ref.to_string());
        Ok(())
    }

    async fn schedule_cancellation(&self, external_ref: &str) -> Result<()> {
        self.guard()?;
        self.scheduled
            .lock()
            .map_err(|_| CoreError::store("processor mutex poisoned"))?
            .push(external_ref.to_string());
        Ok(())
    }

    async fn resume_subscription(&self, external_ref: &str) -> Result<()> {
        self.guard()?;
        self.resumed
            .lock()
            .map_err(|_| CoreError::store("processor mutex poisoned"))?
            .push(external_ref.to_string());
        Ok(())
    }
}

/// Identity directory that records deletions.
#[derive(Clone, Default)]
pub struct MockIdentityDirectory {
    deleted: Arc<Mutex<Vec<MemberId>>>,
}

impl MockIdentityDirectory {
    /// Create an identity directory mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities deleted so far.
    ///
    /// # Errors
    ///
    /// `Store` if the mutex is poisoned.
    pub fn deleted_ids(&self) -> Result<Vec<MemberId>> {
        Ok(self
            .deleted
            .lock()
            .map_err(|_| CoreError::store("identity mutex poisoned"))?
            .clone())
    }
}

impl IdentityDirectory for MockIdentityDirectory {
    async fn delete_identity(&self, member: MemberId) -> Result<()> {
        self.deleted
            .lock()
            .map_err(|_| CoreError::store("identity mutex poisoned"))?
            .push(member);
        Ok(())
    }
}
