//! Application state shared across handlers.

use crate::config::WebhookConfig;
use cinetheque_core::clock::Clock;
use cinetheque_core::deposit::DepositEngine;
use cinetheque_core::external::{CatalogResolver, IdentityDirectory, ProcessorClient};
use cinetheque_core::ingestion::EventIngestor;
use cinetheque_core::redistribution::RedistributionEngine;
use cinetheque_core::registry::OwnershipRegistry;
use cinetheque_core::removal::AccountRemoval;
use cinetheque_core::retry::RetryPolicy;
use cinetheque_core::store::{
    DepositStore, MemberStore, PaymentStore, RegistryStore, SubscriptionStore,
};
use cinetheque_core::subscription::SubscriptionReconciler;
use std::sync::Arc;

/// Everything the handlers need, generic over the store and
/// collaborator implementations so tests run against the in-memory
/// ledger and production runs against PostgreSQL.
#[derive(Clone)]
pub struct AppState<M, R, D, S, L, C, X, I>
where
    M: MemberStore + Clone,
    R: RegistryStore + Clone,
    D: DepositStore + Clone,
    S: SubscriptionStore + Clone,
    L: PaymentStore + Clone,
    C: CatalogResolver + Clone,
    X: ProcessorClient + Clone,
    I: IdentityDirectory + Clone,
{
    /// Member store, used directly for identity resolution.
    pub members: M,
    /// Subscription store, used directly for status queries.
    pub subscriptions: S,
    /// Deposit workflow engine.
    pub deposits: DepositEngine<D, C>,
    /// Ownership registry service.
    pub registry: OwnershipRegistry<R>,
    /// Subscription reconciler.
    pub reconciler: SubscriptionReconciler<S, X>,
    /// Payment event ingestor.
    pub ingestor: EventIngestor<M, R, L, S, X>,
    /// Account removal workflow.
    pub removal: AccountRemoval<M, R, S, X, I>,
    /// Processor client, for self-service checkout and cancellation.
    pub processor: X,
    /// Webhook verification settings.
    pub webhook: WebhookConfig,
    /// Clock, shared with every engine.
    pub clock: Arc<dyn Clock>,
}

impl<M, R, D, S, L, C, X, I> AppState<M, R, D, S, L, C, X, I>
where
    M: MemberStore + Clone,
    R: RegistryStore + Clone,
    D: DepositStore + Clone,
    S: SubscriptionStore + Clone,
    L: PaymentStore + Clone,
    C: CatalogResolver + Clone,
    X: ProcessorClient + Clone,
    I: IdentityDirectory + Clone,
{
    /// Assemble the full engine graph from stores and collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        members: M,
        registry_store: R,
        deposit_store: D,
        subscription_store: S,
        payment_store: L,
        catalog: C,
        processor: X,
        identity: I,
        webhook: WebhookConfig,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = OwnershipRegistry::new(registry_store.clone(), Arc::clone(&clock));
        let reconciler = SubscriptionReconciler::new(
            subscription_store.clone(),
            processor.clone(),
            Arc::clone(&clock),
        );
        let ingestor = EventIngestor::new(
            members.clone(),
            registry.clone(),
            payment_store,
            reconciler.clone(),
            subscription_store.clone(),
            retry,
            Arc::clone(&clock),
        );
        let redistribution =
            RedistributionEngine::new(registry_store, members.clone(), Arc::clone(&clock));
        let removal = AccountRemoval::new(
            members.clone(),
            redistribution,
            subscription_store.clone(),
            processor.clone(),
            identity,
        );
        let deposits = DepositEngine::new(deposit_store, catalog, Arc::clone(&clock));

        Self {
            members,
            subscriptions: subscription_store,
            deposits,
            registry,
            reconciler,
            ingestor,
            removal,
            processor,
            webhook,
            clock,
        }
    }
}
