//! Domain entities for the custody ledger and subscription state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id! {
    /// Identifies a platform member.
    MemberId
}
uuid_id! {
    /// Identifies a physical copy tracked by the registry.
    EntryId
}
uuid_id! {
    /// Identifies a deposit intake record.
    DepositId
}
uuid_id! {
    /// Identifies a catalog title.
    TitleId
}
uuid_id! {
    /// Identifies a subscription plan.
    PlanId
}
uuid_id! {
    /// Identifies a subscription row.
    SubscriptionId
}
uuid_id! {
    /// Identifies a payment record.
    PaymentId
}

/// A platform member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member id (matches the auth-layer identity id).
    pub id: MemberId,
    /// Contact email.
    pub email: String,
    /// Display name shown to other members.
    pub display_name: String,
    /// Whether the member may perform admin actions.
    pub is_admin: bool,
    /// Customer reference at the external payment processor, persisted
    /// the first time the processor reports one.
    pub customer_ref: Option<String>,
    /// When the member joined.
    pub created_at: DateTime<Utc>,
}

/// Physical support a copy is pressed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportKind {
    /// DVD disc.
    Dvd,
    /// Blu-ray disc.
    BluRay,
    /// 4K Ultra HD disc.
    UltraHd,
    /// VHS tape.
    Vhs,
}

impl SupportKind {
    /// Stable string form used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dvd => "dvd",
            Self::BluRay => "blu_ray",
            Self::UltraHd => "ultra_hd",
            Self::Vhs => "vhs",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dvd" => Some(Self::Dvd),
            "blu_ray" => Some(Self::BluRay),
            "ultra_hd" => Some(Self::UltraHd),
            "vhs" => Some(Self::Vhs),
            _ => None,
        }
    }
}

/// How a member came to custody a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMethod {
    /// The member shipped the disc in through the deposit workflow.
    Deposit,
    /// Custody traded between members.
    Exchange,
    /// Granted through a sponsorship link.
    Sponsorship,
    /// Reassigned from a departing member's collection.
    Redistribution,
}

impl AcquisitionMethod {
    /// Stable string form used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Exchange => "exchange",
            Self::Sponsorship => "sponsorship",
            Self::Redistribution => "redistribution",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(Self::Deposit),
            "exchange" => Some(Self::Exchange),
            "sponsorship" => Some(Self::Sponsorship),
            "redistribution" => Some(Self::Redistribution),
            _ => None,
        }
    }
}

/// A single physical copy and its current custodian.
///
/// `owner` is `None` only for copies left behind by a departing member
/// when no other member existed to receive them; such copies stay in
/// the registry, flagged for manual reassignment, rather than pointing
/// at a purged member row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Entry id.
    pub id: EntryId,
    /// Catalog title this copy is a pressing of.
    pub title_id: TitleId,
    /// Physical support.
    pub support: SupportKind,
    /// Current custodian.
    pub owner: Option<MemberId>,
    /// How the current custodian acquired the copy.
    pub method: AcquisitionMethod,
    /// When the current custodian acquired the copy.
    pub acquired_at: DateTime<Utc>,
    /// `false` while an active viewing session holds the copy; an
    /// unavailable copy cannot change hands or be deleted.
    pub available: bool,
    /// Free-form admin notes.
    pub notes: Option<String>,
}

/// Append-only custody ledger row.
///
/// The id is store-assigned and monotonic, so replaying a copy's rows
/// ordered by timestamp then id reconstructs its full custody history
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTransfer {
    /// Monotonic ledger sequence id.
    pub id: i64,
    /// Copy whose custody moved.
    pub entry_id: EntryId,
    /// Previous custodian; `None` for system-initiated creation.
    pub from: Option<MemberId>,
    /// New custodian.
    pub to: MemberId,
    /// Kind of custody change.
    pub method: AcquisitionMethod,
    /// When custody moved.
    pub occurred_at: DateTime<Utc>,
}

/// Lifecycle state of a deposit intake record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// Member declared the shipment; disc is in transit.
    Sent,
    /// Admin confirmed physical receipt.
    Received,
    /// Disc is being digitized.
    Digitizing,
    /// Disc admitted to the registry. Terminal.
    Completed,
    /// Intake refused. Terminal.
    Rejected,
}

impl DepositStatus {
    /// Stable string form used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
            Self::Digitizing => "digitizing",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "received" => Some(Self::Received),
            "digitizing" => Some(Self::Digitizing),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A member's declared intent to ship a physical disc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Deposit id.
    pub id: DepositId,
    /// Declaring member.
    pub member_id: MemberId,
    /// Film title as declared by the member.
    pub declared_title: String,
    /// Declared physical support.
    pub support: SupportKind,
    /// Optional hint to help the admin match a catalog title.
    pub catalog_hint: Option<String>,
    /// Carrier tracking code.
    pub tracking_code: String,
    /// Current workflow state.
    pub status: DepositStatus,
    /// Rejection reason; set only when rejected.
    pub rejection_reason: Option<String>,
    /// Registry entry created on completion.
    pub entry_id: Option<EntryId>,
    /// When the deposit was declared.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

/// Subscription state for a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid up; access granted until expiration.
    Active,
    /// Cancellation scheduled at period end; access continues until
    /// expiration.
    PendingCancellation,
    /// Renewal failed; access revoked immediately regardless of any
    /// remaining paid period.
    Suspended,
}

impl SubscriptionStatus {
    /// Stable string form used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingCancellation => "pending_cancellation",
            Self::Suspended => "suspended",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "pending_cancellation" => Some(Self::PendingCancellation),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// A member's subscription row. At most one live row per member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Subscribed member.
    pub member_id: MemberId,
    /// Plan the member subscribed to.
    pub plan_id: PlanId,
    /// When the subscription started.
    pub started_at: DateTime<Utc>,
    /// When paid-for access runs out.
    pub expires_at: DateTime<Utc>,
    /// Current status.
    pub status: SubscriptionStatus,
    /// Subscription reference at the external processor; `None` for
    /// lifetime grants, which bypass billing entirely.
    pub external_ref: Option<String>,
}

impl Subscription {
    /// `true` if this row is a lifetime grant (no external billing).
    #[must_use]
    pub const fn is_lifetime(&self) -> bool {
        self.external_ref.is_none()
    }
}

/// A billable subscription plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan id.
    pub id: PlanId,
    /// Human-readable plan name.
    pub name: String,
    /// Paid period per billing cycle, in days.
    pub duration_days: i64,
    /// Price reference at the external processor, used to match
    /// checkout payloads back to a plan.
    pub external_price_ref: String,
}

/// What a payment paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PaymentKind {
    /// One-off unlock of a single title.
    OneOff {
        /// Unlocked title.
        title_id: TitleId,
    },
    /// Subscription charge (initial checkout or recurring invoice).
    Subscription,
}

/// Settlement state of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    /// Awaiting processor confirmation.
    Pending,
    /// Confirmed by the processor.
    Settled,
    /// Declined or failed at the processor.
    Failed,
}

impl PaymentRecordStatus {
    /// Stable string form used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Settled => "settled",
            Self::Failed => "failed",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "settled" => Some(Self::Settled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A payment as recorded locally.
///
/// `external_ref` is unique per record and doubles as the idempotency
/// key: replaying a processor event whose reference is already recorded
/// must leave the ledger unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Record id.
    pub id: PaymentId,
    /// Paying member.
    pub member_id: MemberId,
    /// What was paid for.
    pub kind: PaymentKind,
    /// Unique reference at the external processor.
    pub external_ref: String,
    /// Settlement state.
    pub status: PaymentRecordStatus,
    /// Amount in the smallest currency unit.
    pub amount_cents: i64,
    /// When the record was created locally.
    pub created_at: DateTime<Utc>,
    /// When the processor confirmed settlement.
    pub settled_at: Option<DateTime<Utc>>,
}

/// A resolved catalog title, as returned by the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTitle {
    /// Catalog id.
    pub id: TitleId,
    /// Title name.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_string_forms_round_trip() {
        for kind in [
            SupportKind::Dvd,
            SupportKind::BluRay,
            SupportKind::UltraHd,
            SupportKind::Vhs,
        ] {
            assert_eq!(SupportKind::parse(kind.as_str()), Some(kind));
        }
        for method in [
            AcquisitionMethod::Deposit,
            AcquisitionMethod::Exchange,
            AcquisitionMethod::Sponsorship,
            AcquisitionMethod::Redistribution,
        ] {
            assert_eq!(AcquisitionMethod::parse(method.as_str()), Some(method));
        }
        for status in [
            DepositStatus::Sent,
            DepositStatus::Received,
            DepositStatus::Digitizing,
            DepositStatus::Completed,
            DepositStatus::Rejected,
        ] {
            assert_eq!(DepositStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SupportKind::parse("betamax"), None);
    }
}
