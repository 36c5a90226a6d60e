//! Payment event ingestion.
//!
//! Consumes the external processor's webhook events. Two properties
//! govern everything here: processing is idempotent by external
//! reference (the processor redelivers), and the pipeline tolerates
//! out-of-order delivery — an event can arrive before the local write
//! it refers to is visible, which is absorbed by an explicit bounded
//! retry rather than an implicit polling loop.

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::external::ProcessorClient;
use crate::registry::OwnershipRegistry;
use crate::retry::{RetryPolicy, retry_with_predicate};
use crate::store::{MemberStore, PaymentStore, RegistryStore, SubscriptionStore};
use crate::subscription::{ExternalSubscriptionState, SubscriptionReconciler};
use crate::types::{
    MemberId, PaymentId, PaymentKind, PaymentRecord, PaymentRecordStatus, Subscription,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// A recognized processor event, parsed into a closed sum type so the
/// dispatch is exhaustive at compile time instead of a runtime switch
/// with a silent default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A one-off charge settled.
    PaymentSucceeded {
        /// Processor reference of the payment.
        payment_ref: String,
    },
    /// A one-off charge failed.
    PaymentFailed {
        /// Processor reference of the payment.
        payment_ref: String,
    },
    /// A subscription checkout completed.
    CheckoutCompleted {
        /// Processor reference of the checkout session.
        session_ref: String,
        /// Member who checked out (client reference).
        member_id: MemberId,
        /// Customer reference to persist on the member.
        customer_ref: String,
        /// Subscription created by the checkout, absent for one-off
        /// checkouts fulfilled through payment events instead.
        subscription_ref: Option<String>,
        /// Price reference identifying the plan.
        price_ref: Option<String>,
        /// Amount charged, in cents.
        amount_cents: i64,
    },
    /// Subscription state changed at the processor (including a
    /// scheduled cancellation).
    SubscriptionUpdated {
        /// Processor subscription reference.
        subscription_ref: String,
        /// Raw processor status string.
        processor_status: String,
        /// Whether cancellation is scheduled at period end.
        cancel_at_period_end: bool,
    },
    /// Subscription removed at the processor.
    SubscriptionDeleted {
        /// Processor subscription reference.
        subscription_ref: String,
    },
    /// A recurring invoice was paid.
    InvoicePaid {
        /// Processor reference of the invoice.
        invoice_ref: String,
        /// Subscription the invoice renews.
        subscription_ref: String,
        /// End of the newly paid period, when the processor reports it.
        period_end: Option<DateTime<Utc>>,
        /// Amount paid, in cents.
        amount_cents: i64,
    },
    /// A recurring invoice charge failed.
    InvoicePaymentFailed {
        /// Subscription whose renewal failed.
        subscription_ref: String,
    },
    /// Any event type outside the dispatch table. Acknowledged and
    /// otherwise ignored, never an error.
    Unrecognized {
        /// The processor's event type string.
        kind: String,
    },
}

/// An event as delivered by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorEvent {
    /// The processor's unique event id.
    pub id: String,
    /// Parsed event content.
    pub kind: EventKind,
}

impl ProcessorEvent {
    /// Parse a processor payload.
    ///
    /// # Errors
    ///
    /// `Validation` when the envelope (id, type) or the fields a
    /// recognized event requires are missing or malformed. Unknown
    /// event types parse successfully into [`EventKind::Unrecognized`].
    pub fn from_json(payload: &Value) -> Result<Self> {
        let id = required_str(payload, "id")?.to_string();
        let kind_str = required_str(payload, "type")?;
        let object = &payload["data"]["object"];

        let kind = match kind_str {
            "payment_intent.succeeded" => EventKind::PaymentSucceeded {
                payment_ref: required_str(object, "id")?.to_string(),
            },
            "payment_intent.payment_failed" => EventKind::PaymentFailed {
                payment_ref: required_str(object, "id")?.to_string(),
            },
            "checkout.session.completed" => EventKind::CheckoutCompleted {
                session_ref: required_str(object, "id")?.to_string(),
                member_id: parse_member_ref(object)?,
                customer_ref: required_str(object, "customer")?.to_string(),
                subscription_ref: object["subscription"].as_str().map(str::to_string),
                price_ref: object["metadata"]["price_ref"].as_str().map(str::to_string),
                amount_cents: object["amount_total"].as_i64().unwrap_or(0),
            },
            "customer.subscription.updated" => EventKind::SubscriptionUpdated {
                subscription_ref: required_str(object, "id")?.to_string(),
                processor_status: required_str(object, "status")?.to_string(),
                cancel_at_period_end: object["cancel_at_period_end"].as_bool().unwrap_or(false),
            },
            "customer.subscription.deleted" => EventKind::SubscriptionDeleted {
                subscription_ref: required_str(object, "id")?.to_string(),
            },
            "invoice.paid" => EventKind::InvoicePaid {
                invoice_ref: required_str(object, "id")?.to_string(),
                subscription_ref: required_str(object, "subscription")?.to_string(),
                period_end: object["period_end"]
                    .as_i64()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                amount_cents: object["amount_paid"].as_i64().unwrap_or(0),
            },
            "invoice.payment_failed" => EventKind::InvoicePaymentFailed {
                subscription_ref: required_str(object, "subscription")?.to_string(),
            },
            other => EventKind::Unrecognized {
                kind: other.to_string(),
            },
        };

        Ok(Self { id, kind })
    }
}

fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str> {
    value[field]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::validation(format!("event payload is missing `{field}`")))
}

fn parse_member_ref(object: &Value) -> Result<MemberId> {
    let raw = required_str(object, "client_reference_id")?;
    let uuid = Uuid::parse_str(raw)
        .map_err(|_| CoreError::validation("client reference is not a member id"))?;
    Ok(MemberId(uuid))
}

/// What processing an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Side effects were applied.
    Applied,
    /// The event had already been applied; nothing changed.
    AlreadyApplied,
    /// The event carries nothing for this system.
    Ignored,
}

/// Idempotent, retry-safe consumer of processor events.
#[derive(Clone)]
pub struct EventIngestor<M, R, L, S, X> {
    members: M,
    registry: OwnershipRegistry<R>,
    payments: L,
    reconciler: SubscriptionReconciler<S, X>,
    subscriptions: S,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl<M, R, L, S, X> EventIngestor<M, R, L, S, X>
where
    M: MemberStore,
    R: RegistryStore,
    L: PaymentStore,
    S: SubscriptionStore + Clone,
    X: ProcessorClient,
{
    /// Wire the ingestor to its collaborators.
    pub fn new(
        members: M,
        registry: OwnershipRegistry<R>,
        payments: L,
        reconciler: SubscriptionReconciler<S, X>,
        subscriptions: S,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            members,
            registry,
            payments,
            reconciler,
            subscriptions,
            retry,
            clock,
        }
    }

    /// Process one delivered event.
    ///
    /// Safe to call twice with the same event: the second call reports
    /// [`Ingested::AlreadyApplied`] without granting access twice,
    /// extending twice or recording a duplicate payment.
    ///
    /// # Errors
    ///
    /// `NotFound` when a referenced local record is still not visible
    /// after the bounded retry (the sender should redeliver),
    /// `Validation` on payloads missing required fields, `Store` and
    /// `Processor` for downstream failures.
    pub async fn ingest(&self, event: &ProcessorEvent) -> Result<Ingested> {
        let outcome = match &event.kind {
            EventKind::PaymentSucceeded { payment_ref } => {
                self.settle_one_off(payment_ref).await?
            }
            EventKind::PaymentFailed { payment_ref } => self.fail_one_off(payment_ref).await?,
            EventKind::CheckoutCompleted {
                session_ref,
                member_id,
                customer_ref,
                subscription_ref,
                price_ref,
                amount_cents,
            } => {
                self.complete_checkout(
                    session_ref,
                    *member_id,
                    customer_ref,
                    subscription_ref.as_deref(),
                    price_ref.as_deref(),
                    *amount_cents,
                )
                .await?
            }
            EventKind::SubscriptionUpdated {
                subscription_ref,
                processor_status,
                cancel_at_period_end,
            } => {
                self.update_subscription(subscription_ref, processor_status, *cancel_at_period_end)
                    .await?
            }
            EventKind::SubscriptionDeleted { subscription_ref } => {
                self.delete_subscription(subscription_ref).await?
            }
            EventKind::InvoicePaid {
                invoice_ref,
                subscription_ref,
                period_end,
                amount_cents,
            } => {
                self.renew_subscription(invoice_ref, subscription_ref, *period_end, *amount_cents)
                    .await?
            }
            EventKind::InvoicePaymentFailed { subscription_ref } => {
                self.suspend_subscription(subscription_ref).await?
            }
            EventKind::Unrecognized { kind } => {
                tracing::debug!(event_id = %event.id, kind = %kind, "unrecognized event acknowledged");
                Ingested::Ignored
            }
        };

        tracing::info!(event_id = %event.id, outcome = ?outcome, "event ingested");
        Ok(outcome)
    }

    /// Locate a payment record, absorbing the visibility race between
    /// this event and the local write that created the record.
    async fn payment_by_ref(&self, payment_ref: &str) -> Result<PaymentRecord> {
        let payments = &self.payments;
        retry_with_predicate(
            &self.retry,
            || async move {
                payments
                    .find_payment_by_external_ref(payment_ref)
                    .await?
                    .ok_or(CoreError::not_found("PaymentRecord"))
            },
            |err| err.is_retryable() || matches!(err, CoreError::NotFound { .. }),
        )
        .await
    }

    /// Locate a subscription row by processor reference, with the same
    /// visibility-race tolerance.
    async fn subscription_by_ref(&self, subscription_ref: &str) -> Result<Subscription> {
        let subscriptions = &self.subscriptions;
        retry_with_predicate(
            &self.retry,
            || async move {
                subscriptions
                    .find_subscription_by_external_ref(subscription_ref)
                    .await?
                    .ok_or(CoreError::not_found("Subscription"))
            },
            |err| err.is_retryable() || matches!(err, CoreError::NotFound { .. }),
        )
        .await
    }

    async fn settle_one_off(&self, payment_ref: &str) -> Result<Ingested> {
        let payment = self.payment_by_ref(payment_ref).await?;
        let (settled, newly) = self
            .payments
            .settle_payment(payment_ref, self.clock.now())
            .await?;

        if !newly {
            return Ok(Ingested::AlreadyApplied);
        }

        if let PaymentKind::OneOff { title_id } = payment.kind {
            self.registry
                .grant_title_access(settled.member_id, title_id)
                .await?;
        }
        Ok(Ingested::Applied)
    }

    async fn fail_one_off(&self, payment_ref: &str) -> Result<Ingested> {
        let payment = self.payment_by_ref(payment_ref).await?;
        if payment.status == PaymentRecordStatus::Failed {
            return Ok(Ingested::AlreadyApplied);
        }
        self.payments.fail_payment(payment_ref).await?;
        Ok(Ingested::Applied)
    }

    async fn complete_checkout(
        &self,
        session_ref: &str,
        member_id: MemberId,
        customer_ref: &str,
        subscription_ref: Option<&str>,
        price_ref: Option<&str>,
        amount_cents: i64,
    ) -> Result<Ingested> {
        let Some(subscription_ref) = subscription_ref else {
            // One-off checkouts are fulfilled through payment events.
            return Ok(Ingested::Ignored);
        };

        if self
            .payments
            .find_payment_by_external_ref(session_ref)
            .await?
            .is_some()
        {
            return Ok(Ingested::AlreadyApplied);
        }

        let price_ref = price_ref
            .ok_or_else(|| CoreError::validation("checkout payload is missing its price reference"))?;
        let plan = self
            .subscriptions
            .find_plan_by_price_ref(price_ref)
            .await?
            .ok_or_else(|| {
                CoreError::validation(format!("no plan matches price reference `{price_ref}`"))
            })?;

        self.members.set_customer_ref(member_id, customer_ref).await?;
        self.reconciler
            .activate(member_id, plan.id, subscription_ref)
            .await?;

        let now = self.clock.now();
        self.payments
            .insert_payment_if_absent(&PaymentRecord {
                id: PaymentId::new(),
                member_id,
                kind: PaymentKind::Subscription,
                external_ref: session_ref.to_string(),
                status: PaymentRecordStatus::Settled,
                amount_cents,
                created_at: now,
                settled_at: Some(now),
            })
            .await?;
        Ok(Ingested::Applied)
    }

    async fn update_subscription(
        &self,
        subscription_ref: &str,
        processor_status: &str,
        cancel_at_period_end: bool,
    ) -> Result<Ingested> {
        let subscription = self.subscription_by_ref(subscription_ref).await?;

        let state = match processor_status {
            "active" | "trialing" if cancel_at_period_end => {
                ExternalSubscriptionState::PendingCancellation
            }
            "active" | "trialing" => ExternalSubscriptionState::Active,
            _ => ExternalSubscriptionState::Suspended,
        };

        let before = subscription.status;
        let after = self
            .reconciler
            .apply_external_state(subscription.member_id, state)
            .await?;

        if before == after.status {
            Ok(Ingested::AlreadyApplied)
        } else {
            Ok(Ingested::Applied)
        }
    }

    async fn delete_subscription(&self, subscription_ref: &str) -> Result<Ingested> {
        let Some(subscription) = self
            .subscriptions
            .find_subscription_by_external_ref(subscription_ref)
            .await?
        else {
            // Nothing left to suspend; the row was already dropped.
            return Ok(Ingested::AlreadyApplied);
        };

        self.reconciler.suspend(subscription.member_id).await?;
        Ok(Ingested::Applied)
    }

    async fn renew_subscription(
        &self,
        invoice_ref: &str,
        subscription_ref: &str,
        period_end: Option<DateTime<Utc>>,
        amount_cents: i64,
    ) -> Result<Ingested> {
        if self
            .payments
            .find_payment_by_external_ref(invoice_ref)
            .await?
            .is_some()
        {
            return Ok(Ingested::AlreadyApplied);
        }

        let subscription = self.subscription_by_ref(subscription_ref).await?;
        self.reconciler
            .extend(subscription.member_id, subscription_ref, period_end)
            .await?;

        let now = self.clock.now();
        self.payments
            .insert_payment_if_absent(&PaymentRecord {
                id: PaymentId::new(),
                member_id: subscription.member_id,
                kind: PaymentKind::Subscription,
                external_ref: invoice_ref.to_string(),
                status: PaymentRecordStatus::Settled,
                amount_cents,
                created_at: now,
                settled_at: Some(now),
            })
            .await?;
        Ok(Ingested::Applied)
    }

    async fn suspend_subscription(&self, subscription_ref: &str) -> Result<Ingested> {
        let subscription = self.subscription_by_ref(subscription_ref).await?;
        let before = subscription.status;
        let after = self.reconciler.suspend(subscription.member_id).await?;

        if before == after.status {
            Ok(Ingested::AlreadyApplied)
        } else {
            Ok(Ingested::Applied)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::{MemoryLedger, MockProcessor};
    use crate::types::{Member, Plan, PlanId, SubscriptionStatus, TitleId};
    use chrono::Duration;
    use serde_json::json;

    struct Fixture {
        ingestor: EventIngestor<MemoryLedger, MemoryLedger, MemoryLedger, MemoryLedger, MockProcessor>,
        reconciler: SubscriptionReconciler<MemoryLedger, MockProcessor>,
        ledger: MemoryLedger,
        clock: FixedClock,
        plan: Plan,
    }

    fn fixture() -> Fixture {
        let ledger = MemoryLedger::new();
        let processor = MockProcessor::new();
        let clock = FixedClock::at("2026-05-10T09:00:00Z".parse().unwrap());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

        let plan = Plan {
            id: PlanId::new(),
            name: "Cinephile".to_string(),
            duration_days: 30,
            external_price_ref: "price_cinephile_monthly".to_string(),
        };
        ledger.seed_plan(plan.clone()).unwrap();

        let registry = OwnershipRegistry::new(ledger.clone(), Arc::clone(&shared_clock));
        let reconciler = SubscriptionReconciler::new(
            ledger.clone(),
            processor.clone(),
            Arc::clone(&shared_clock),
        );
        let ingestor = EventIngestor::new(
            ledger.clone(),
            registry,
            ledger.clone(),
            reconciler.clone(),
            ledger.clone(),
            RetryPolicy::no_retries(),
            shared_clock,
        );
        Fixture {
            ingestor,
            reconciler,
            ledger,
            clock,
            plan,
        }
    }

    fn seed_member(f: &Fixture) -> MemberId {
        let member = Member {
            id: MemberId::new(),
            email: "chris@example.org".to_string(),
            display_name: "chris".to_string(),
            is_admin: false,
            customer_ref: None,
            created_at: f.clock.now(),
        };
        let id = member.id;
        f.ledger.seed_member(member).unwrap();
        id
    }

    async fn pending_one_off(f: &Fixture, member: MemberId, title: TitleId, external_ref: &str) {
        f.ledger
            .insert_payment_if_absent(&PaymentRecord {
                id: PaymentId::new(),
                member_id: member,
                kind: PaymentKind::OneOff { title_id: title },
                external_ref: external_ref.to_string(),
                status: PaymentRecordStatus::Pending,
                amount_cents: 399,
                created_at: f.clock.now(),
                settled_at: None,
            })
            .await
            .unwrap();
    }

    fn event(kind: EventKind) -> ProcessorEvent {
        ProcessorEvent {
            id: "evt_1".to_string(),
            kind,
        }
    }

    #[tokio::test]
    async fn replayed_one_off_settlement_grants_once() {
        let f = fixture();
        let member = seed_member(&f);
        let title = TitleId::new();
        pending_one_off(&f, member, title, "pi_100").await;

        let succeeded = event(EventKind::PaymentSucceeded {
            payment_ref: "pi_100".to_string(),
        });

        assert_eq!(f.ingestor.ingest(&succeeded).await.unwrap(), Ingested::Applied);
        assert!(f.ledger.has_title_grant(member, title).unwrap());

        // Second delivery of the same event: success, but nothing new.
        assert_eq!(
            f.ingestor.ingest(&succeeded).await.unwrap(),
            Ingested::AlreadyApplied
        );
        let record = f
            .ledger
            .find_payment_by_external_ref("pi_100")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentRecordStatus::Settled);
    }

    #[tokio::test]
    async fn settlement_for_an_invisible_record_surfaces_not_found() {
        let f = fixture();
        let err = f
            .ingestor
            .ingest(&event(EventKind::PaymentSucceeded {
                payment_ref: "pi_ghost".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn failed_one_off_marks_the_record_only() {
        let f = fixture();
        let member = seed_member(&f);
        let title = TitleId::new();
        pending_one_off(&f, member, title, "pi_100").await;

        let outcome = f
            .ingestor
            .ingest(&event(EventKind::PaymentFailed {
                payment_ref: "pi_100".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(outcome, Ingested::Applied);
        assert!(!f.ledger.has_title_grant(member, title).unwrap());
        let record = f
            .ledger
            .find_payment_by_external_ref("pi_100")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentRecordStatus::Failed);
    }

    #[tokio::test]
    async fn checkout_activates_and_records_once() {
        let f = fixture();
        let member = seed_member(&f);

        let checkout = event(EventKind::CheckoutCompleted {
            session_ref: "cs_100".to_string(),
            member_id: member,
            customer_ref: "cus_42".to_string(),
            subscription_ref: Some("sub_100".to_string()),
            price_ref: Some("price_cinephile_monthly".to_string()),
            amount_cents: 999,
        });

        assert_eq!(f.ingestor.ingest(&checkout).await.unwrap(), Ingested::Applied);

        let stored = f.ledger.get_member(member).await.unwrap();
        assert_eq!(stored.customer_ref.as_deref(), Some("cus_42"));
        let sub = f.ledger.find_subscription(member).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.external_ref.as_deref(), Some("sub_100"));

        assert_eq!(
            f.ingestor.ingest(&checkout).await.unwrap(),
            Ingested::AlreadyApplied
        );
    }

    #[tokio::test]
    async fn renewal_extends_once_and_replays_cleanly() {
        let f = fixture();
        let member = seed_member(&f);
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        let before = f.ledger.find_subscription(member).await.unwrap().unwrap();

        let period_end = before.expires_at + Duration::days(30);
        let renewal = event(EventKind::InvoicePaid {
            invoice_ref: "in_100".to_string(),
            subscription_ref: "sub_100".to_string(),
            period_end: Some(period_end),
            amount_cents: 999,
        });

        assert_eq!(f.ingestor.ingest(&renewal).await.unwrap(), Ingested::Applied);
        let after = f.ledger.find_subscription(member).await.unwrap().unwrap();
        assert_eq!(after.expires_at, period_end);

        assert_eq!(
            f.ingestor.ingest(&renewal).await.unwrap(),
            Ingested::AlreadyApplied
        );
        let replayed = f.ledger.find_subscription(member).await.unwrap().unwrap();
        assert_eq!(replayed.expires_at, period_end);
    }

    #[tokio::test]
    async fn failed_renewal_suspends_immediately() {
        let f = fixture();
        let member = seed_member(&f);
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();
        f.clock.advance(Duration::days(20));

        let outcome = f
            .ingestor
            .ingest(&event(EventKind::InvoicePaymentFailed {
                subscription_ref: "sub_100".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(outcome, Ingested::Applied);

        let sub = f.ledger.find_subscription(member).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Suspended);
        assert!(sub.expires_at > f.clock.now());
        assert!(!f.reconciler.has_access(member).await.unwrap());
    }

    #[tokio::test]
    async fn scheduled_cancellation_maps_to_pending() {
        let f = fixture();
        let member = seed_member(&f);
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();

        let outcome = f
            .ingestor
            .ingest(&event(EventKind::SubscriptionUpdated {
                subscription_ref: "sub_100".to_string(),
                processor_status: "active".to_string(),
                cancel_at_period_end: true,
            }))
            .await
            .unwrap();
        assert_eq!(outcome, Ingested::Applied);

        let sub = f.ledger.find_subscription(member).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PendingCancellation);

        // The processor reporting plain active again undoes it.
        f.ingestor
            .ingest(&event(EventKind::SubscriptionUpdated {
                subscription_ref: "sub_100".to_string(),
                processor_status: "active".to_string(),
                cancel_at_period_end: false,
            }))
            .await
            .unwrap();
        let sub = f.ledger.find_subscription(member).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn deleted_subscription_suspends_and_tolerates_absence() {
        let f = fixture();
        let member = seed_member(&f);
        f.reconciler
            .activate(member, f.plan.id, "sub_100")
            .await
            .unwrap();

        let deleted = event(EventKind::SubscriptionDeleted {
            subscription_ref: "sub_100".to_string(),
        });
        assert_eq!(f.ingestor.ingest(&deleted).await.unwrap(), Ingested::Applied);

        let gone = event(EventKind::SubscriptionDeleted {
            subscription_ref: "sub_unknown".to_string(),
        });
        assert_eq!(
            f.ingestor.ingest(&gone).await.unwrap(),
            Ingested::AlreadyApplied
        );
    }

    #[tokio::test]
    async fn unrecognized_events_are_acknowledged() {
        let f = fixture();
        let outcome = f
            .ingestor
            .ingest(&event(EventKind::Unrecognized {
                kind: "charge.refund.updated".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(outcome, Ingested::Ignored);
    }

    #[test]
    fn payloads_parse_into_the_closed_event_set() {
        let payload = json!({
            "id": "evt_55",
            "type": "invoice.paid",
            "data": { "object": {
                "id": "in_55",
                "subscription": "sub_100",
                "period_end": 1_780_000_000,
                "amount_paid": 999
            }}
        });
        let parsed = ProcessorEvent::from_json(&payload).unwrap();
        assert_eq!(parsed.id, "evt_55");
        assert!(matches!(parsed.kind, EventKind::InvoicePaid { .. }));

        let unknown = json!({
            "id": "evt_56",
            "type": "customer.tax_id.created",
            "data": { "object": { "id": "txi_1" } }
        });
        let parsed = ProcessorEvent::from_json(&unknown).unwrap();
        assert!(matches!(parsed.kind, EventKind::Unrecognized { .. }));
    }

    #[test]
    fn malformed_payloads_are_validation_errors() {
        let missing_id = json!({ "type": "invoice.paid", "data": { "object": {} } });
        assert!(matches!(
            ProcessorEvent::from_json(&missing_id).unwrap_err(),
            CoreError::Validation { .. }
        ));

        let missing_subscription = json!({
            "id": "evt_57",
            "type": "invoice.payment_failed",
            "data": { "object": { "id": "in_57" } }
        });
        assert!(matches!(
            ProcessorEvent::from_json(&missing_subscription).unwrap_err(),
            CoreError::Validation { .. }
        ));
    }
}
