//! Router composition.

use crate::handlers::{deposits, members, registry, subscriptions, webhook};
use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post};
use cinetheque_core::external::{CatalogResolver, IdentityDirectory, ProcessorClient};
use cinetheque_core::store::{
    DepositStore, MemberStore, PaymentStore, RegistryStore, SubscriptionStore,
};
use tower_http::trace::TraceLayer;

/// Build the full application router.
///
/// # Routes
///
/// ## Member-facing
/// - `POST /api/deposits` — declare an inbound shipment
/// - `GET /api/deposits` — own deposits
/// - `POST /api/subscription/subscribe` — start a checkout
/// - `POST /api/subscription/cancel` — schedule cancellation
/// - `POST /api/subscription/reactivate` — undo cancellation
/// - `GET /api/subscription` — status poll
///
/// ## Admin
/// - `GET /api/admin/deposits` — deposits by status
/// - `POST /api/admin/deposits/:id/receive|digitize|reject|complete`
/// - `POST /api/admin/registry` — manual entry creation
/// - `POST /api/admin/registry/:id/transfer` — custody transfer
/// - `DELETE /api/admin/registry/:id` — irreversible deletion
/// - `GET /api/admin/registry/:id/history` — custody history
/// - `DELETE /api/admin/members/:id` — member deletion
/// - `DELETE /api/admin/identities/:id` — orphan identity cleanup
/// - `POST /api/admin/members/:id/lifetime` — lifetime grant
///
/// ## Processor
/// - `POST /api/webhooks/processor` — signed event deliveries
pub fn build_router<M, R, D, S, L, C, X, I>(state: AppState<M, R, D, S, L, C, X, I>) -> Router
where
    M: MemberStore + Clone + 'static,
    R: RegistryStore + Clone + 'static,
    D: DepositStore + Clone + 'static,
    S: SubscriptionStore + Clone + 'static,
    L: PaymentStore + Clone + 'static,
    C: CatalogResolver + Clone + 'static,
    X: ProcessorClient + Clone + 'static,
    I: IdentityDirectory + Clone + 'static,
{
    Router::new()
        // Member-facing deposit intake
        .route(
            "/api/deposits",
            post(deposits::declare::<M, R, D, S, L, C, X, I>)
                .get(deposits::list_own::<M, R, D, S, L, C, X, I>),
        )
        // Admin deposit workflow
        .route(
            "/api/admin/deposits",
            get(deposits::list::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/admin/deposits/:id/receive",
            post(deposits::receive::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/admin/deposits/:id/digitize",
            post(deposits::digitize::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/admin/deposits/:id/reject",
            post(deposits::reject::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/admin/deposits/:id/complete",
            post(deposits::complete::<M, R, D, S, L, C, X, I>),
        )
        // Admin registry
        .route(
            "/api/admin/registry",
            post(registry::create::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/admin/registry/:id",
            delete(registry::delete::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/admin/registry/:id/transfer",
            post(registry::transfer::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/admin/registry/:id/history",
            get(registry::history::<M, R, D, S, L, C, X, I>),
        )
        // Admin members
        .route(
            "/api/admin/members/:id",
            delete(members::remove::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/admin/members/:id/lifetime",
            post(members::grant_lifetime::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/admin/identities/:id",
            delete(members::remove_orphan::<M, R, D, S, L, C, X, I>),
        )
        // Member self-service subscription
        .route(
            "/api/subscription",
            get(subscriptions::status::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/subscription/subscribe",
            post(subscriptions::subscribe::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/subscription/cancel",
            post(subscriptions::cancel::<M, R, D, S, L, C, X, I>),
        )
        .route(
            "/api/subscription/reactivate",
            post(subscriptions::reactivate::<M, R, D, S, L, C, X, I>),
        )
        // Processor events
        .route(
            "/api/webhooks/processor",
            post(webhook::receive::<M, R, D, S, L, C, X, I>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
