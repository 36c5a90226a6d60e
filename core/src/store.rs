//! Ledger store traits.
//!
//! The backing store is a transactional relational database. These
//! traits describe the operations the engines need; composite
//! operations (deposit completion, custody transfer, engagement
//! detachment) are single methods so implementations can make them
//! atomic, because partial application under external retries is the
//! primary correctness risk.

use crate::error::Result;
use crate::types::{
    AcquisitionMethod, Deposit, DepositId, DepositStatus, EntryId, Member, MemberId,
    OwnershipTransfer, PaymentRecord, Plan, PlanId, RegistryEntry, Subscription, SubscriptionId,
    TitleId,
};
use chrono::{DateTime, Utc};

/// Member rows and their engagement data.
pub trait MemberStore: Send + Sync {
    /// Fetch a member by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such member, `Store` on round-trip failure.
    fn get_member(&self, id: MemberId) -> impl Future<Output = Result<Member>> + Send;

    /// Find a member by their external processor customer reference.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn find_member_by_customer_ref(
        &self,
        customer_ref: &str,
    ) -> impl Future<Output = Result<Option<Member>>> + Send;

    /// Insert a member row.
    ///
    /// # Errors
    ///
    /// `Conflict` if the email is taken, `Store` on round-trip failure.
    fn insert_member(&self, member: &Member) -> impl Future<Output = Result<()>> + Send;

    /// Persist the external customer reference on a member.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such member, `Store` on round-trip failure.
    fn set_customer_ref(
        &self,
        id: MemberId,
        customer_ref: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Ids of all members other than the excluded one, in a stable
    /// order. Used to build the redistribution recipient pool.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn list_members_except(
        &self,
        excluded: MemberId,
    ) -> impl Future<Output = Result<Vec<MemberId>>> + Send;

    /// Atomically detach a member's engagement rows: likes and
    /// sponsorship links are dropped, active viewing sessions are ended
    /// and the copies they held are made available again.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn detach_engagements(&self, id: MemberId) -> impl Future<Output = Result<()>> + Send;

    /// Delete the member row itself.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such member, `Conflict` if registry entries
    /// still reference the member, `Store` on round-trip failure.
    fn delete_member(&self, id: MemberId) -> impl Future<Output = Result<()>> + Send;
}

/// Physical-copy registry and its append-only custody ledger.
pub trait RegistryStore: Send + Sync {
    /// Fetch an entry by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such entry, `Store` on round-trip failure.
    fn get_entry(&self, id: EntryId) -> impl Future<Output = Result<RegistryEntry>> + Send;

    /// Atomically insert a new entry together with its initial ledger
    /// row (`from = None`).
    ///
    /// # Errors
    ///
    /// `Validation` if the entry has no owner, `Store` on round-trip
    /// failure.
    fn insert_entry(
        &self,
        entry: &RegistryEntry,
    ) -> impl Future<Output = Result<OwnershipTransfer>> + Send;

    /// Atomically move custody of an entry: checks availability,
    /// updates the owner and appends a ledger row in one transaction.
    ///
    /// # Errors
    ///
    /// `Conflict` if the entry is held by an active viewing session,
    /// `NotFound` if no such entry, `Store` on round-trip failure.
    fn transfer_entry(
        &self,
        id: EntryId,
        to: MemberId,
        method: AcquisitionMethod,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<OwnershipTransfer>> + Send;

    /// Clear an entry's owner, flagging it for manual reassignment.
    /// Used only when redistribution finds no eligible recipient.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such entry, `Store` on round-trip failure.
    fn mark_entry_unassigned(&self, id: EntryId) -> impl Future<Output = Result<()>> + Send;

    /// Delete an entry and cascade its ledger rows. Returns how many
    /// ledger rows were dropped.
    ///
    /// # Errors
    ///
    /// `Conflict` if the entry is held by an active viewing session,
    /// `NotFound` if no such entry, `Store` on round-trip failure.
    fn delete_entry(&self, id: EntryId) -> impl Future<Output = Result<u64>> + Send;

    /// Ledger rows for an entry, oldest first (timestamp, then id).
    ///
    /// # Errors
    ///
    /// `NotFound` if no such entry, `Store` on round-trip failure.
    fn entry_history(
        &self,
        id: EntryId,
    ) -> impl Future<Output = Result<Vec<OwnershipTransfer>>> + Send;

    /// All entries currently custodied by a member.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn entries_owned_by(
        &self,
        member: MemberId,
    ) -> impl Future<Output = Result<Vec<RegistryEntry>>> + Send;

    /// `true` if the member custodies any copy of the title.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn owns_title(
        &self,
        member: MemberId,
        title: TitleId,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Flip an entry's availability flag. Driven by the viewing-session
    /// component at the system boundary.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such entry, `Store` on round-trip failure.
    fn set_entry_available(
        &self,
        id: EntryId,
        available: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Record a single-title streaming grant. Keyed uniquely by
    /// (member, title): returns `false` without writing when the grant
    /// already exists.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn grant_title(
        &self,
        member: MemberId,
        title: TitleId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Total number of registry entries.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn count_entries(&self) -> impl Future<Output = Result<u64>> + Send;
}

/// Deposit intake records.
pub trait DepositStore: Send + Sync {
    /// Fetch a deposit by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such deposit, `Store` on round-trip failure.
    fn get_deposit(&self, id: DepositId) -> impl Future<Output = Result<Deposit>> + Send;

    /// Insert a freshly declared deposit.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn insert_deposit(&self, deposit: &Deposit) -> impl Future<Output = Result<()>> + Send;

    /// Deposits declared by a member, newest first.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn deposits_for_member(
        &self,
        member: MemberId,
    ) -> impl Future<Output = Result<Vec<Deposit>>> + Send;

    /// All deposits currently in the given status, oldest first.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn deposits_in_status(
        &self,
        status: DepositStatus,
    ) -> impl Future<Output = Result<Vec<Deposit>>> + Send;

    /// Atomically advance a deposit's status, guarded by its expected
    /// current status so concurrent admin actions cannot double-apply.
    ///
    /// # Errors
    ///
    /// `Conflict` if the deposit is no longer in `from`, `NotFound` if
    /// no such deposit, `Store` on round-trip failure.
    fn advance_deposit(
        &self,
        id: DepositId,
        from: DepositStatus,
        to: DepositStatus,
        rejection_reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Deposit>> + Send;

    /// Atomically complete a deposit: flips the status to `Completed`,
    /// inserts the registry entry, appends the initial ledger row and
    /// links the entry back to the deposit — all in one transaction.
    ///
    /// # Errors
    ///
    /// `Conflict` if the deposit is not in `Received` or `Digitizing`,
    /// `NotFound` if no such deposit, `Store` on round-trip failure.
    fn complete_deposit(
        &self,
        id: DepositId,
        entry: &RegistryEntry,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Deposit>> + Send;
}

/// Subscription rows and plans.
pub trait SubscriptionStore: Send + Sync {
    /// The member's live subscription row, if any.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn find_subscription(
        &self,
        member: MemberId,
    ) -> impl Future<Output = Result<Option<Subscription>>> + Send;

    /// The member's subscription row for a specific plan, if any.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn find_subscription_for_plan(
        &self,
        member: MemberId,
        plan: PlanId,
    ) -> impl Future<Output = Result<Option<Subscription>>> + Send;

    /// Locate a subscription row by its external processor reference.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn find_subscription_by_external_ref(
        &self,
        external_ref: &str,
    ) -> impl Future<Output = Result<Option<Subscription>>> + Send;

    /// Insert a subscription row.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn insert_subscription(
        &self,
        subscription: &Subscription,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Replace a subscription row by id (row-level atomic).
    ///
    /// # Errors
    ///
    /// `NotFound` if no such row, `Store` on round-trip failure.
    fn update_subscription(
        &self,
        subscription: &Subscription,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically raise a subscription's expiration to the candidate if
    /// the candidate is later (`GREATEST` semantics), so a stale
    /// renewal can never shrink the paid-for period.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such row, `Store` on round-trip failure.
    fn extend_subscription(
        &self,
        id: SubscriptionId,
        candidate: DateTime<Utc>,
    ) -> impl Future<Output = Result<Subscription>> + Send;

    /// Drop all subscription rows for a member.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn delete_subscriptions_for_member(
        &self,
        member: MemberId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch a plan by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such plan, `Store` on round-trip failure.
    fn get_plan(&self, id: PlanId) -> impl Future<Output = Result<Plan>> + Send;

    /// Match a plan by the external price reference the processor
    /// reports in checkout payloads.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn find_plan_by_price_ref(
        &self,
        price_ref: &str,
    ) -> impl Future<Output = Result<Option<Plan>>> + Send;

    /// Insert a plan.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn insert_plan(&self, plan: &Plan) -> impl Future<Output = Result<()>> + Send;
}

/// Locally recorded payments, keyed by external reference.
pub trait PaymentStore: Send + Sync {
    /// Insert a payment record unless its external reference is
    /// already present. Returns `true` only when a row was written;
    /// this is the ingestion dedup gate.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn insert_payment_if_absent(
        &self,
        payment: &PaymentRecord,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Find a payment by its external reference.
    ///
    /// # Errors
    ///
    /// `Store` on round-trip failure.
    fn find_payment_by_external_ref(
        &self,
        external_ref: &str,
    ) -> impl Future<Output = Result<Option<PaymentRecord>>> + Send;

    /// Mark a payment settled. Returns the record and whether this call
    /// changed it (`false` means it was already settled).
    ///
    /// # Errors
    ///
    /// `NotFound` if no such payment, `Store` on round-trip failure.
    fn settle_payment(
        &self,
        external_ref: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(PaymentRecord, bool)>> + Send;

    /// Mark a payment failed.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such payment, `Store` on round-trip failure.
    fn fail_payment(
        &self,
        external_ref: &str,
    ) -> impl Future<Output = Result<PaymentRecord>> + Send;
}
