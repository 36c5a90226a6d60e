//! Member self-service subscription endpoints.

use crate::error::ApiError;
use crate::extract::current_member;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use cinetheque_core::external::{CatalogResolver, IdentityDirectory, ProcessorClient};
use cinetheque_core::store::{
    DepositStore, MemberStore, PaymentStore, RegistryStore, SubscriptionStore,
};
use cinetheque_core::types::{PlanId, Subscription, SubscriptionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscribe payload.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    /// Plan to subscribe to.
    pub plan_id: PlanId,
}

/// Checkout redirect response.
#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    /// Hosted checkout URL; the subscription itself lands through the
    /// processor's event stream once payment completes.
    pub checkout_url: String,
}

/// Start a subscription checkout.
///
/// # Errors
///
/// 401 without an authenticated member, 404 for an unknown plan, 502
/// when the processor refuses the checkout.
pub async fn subscribe<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError>
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
    let member = current_member(&state.members, &headers).await?;
    let plan = state.subscriptions.get_plan(request.plan_id).await?;
    let checkout_url = state.processor.create_checkout(member.id, &plan).await?;
    Ok(Json(SubscribeResponse { checkout_url }))
}

/// Subscription status payload, the single query polled while waiting
/// for webhook-driven changes to land.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Current status; `None` without a subscription.
    pub status: Option<SubscriptionStatus>,
    /// Paid-for period end.
    pub expires_at: Option<DateTime<Utc>>,
    /// Days of paid access left, rounded up.
    pub days_remaining: Option<i64>,
    /// Whether streaming access is currently granted.
    pub has_access: bool,
    /// Whether this is a lifetime grant.
    pub lifetime: bool,
}

/// The authenticated member's subscription status.
///
/// # Errors
///
/// 401 without an authenticated member.
pub async fn status<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError>
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
    let member = current_member(&state.members, &headers).await?;
    let subscription = state.subscriptions.find_subscription(member.id).await?;
    let has_access = state.reconciler.has_access(member.id).await?;
    let days_remaining = state.reconciler.days_remaining(member.id).await?;

    Ok(Json(StatusResponse {
        status: subscription.as_ref().map(|s| s.status),
        expires_at: subscription.as_ref().map(|s| s.expires_at),
        days_remaining,
        has_access,
        lifetime: subscription.as_ref().is_some_and(Subscription::is_lifetime),
    }))
}

/// Schedule cancellation at period end. Access continues until the
/// paid period runs out.
///
/// # Errors
///
/// 401 without an authenticated member, 404 without a subscription,
/// 409 when the subscription cannot schedule a cancellation, 502 when
/// the processor refuses.
pub async fn cancel<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError>
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
    let member = current_member(&state.members, &headers).await?;
    let subscription = state
        .subscriptions
        .find_subscription(member.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subscription not found"))?;

    // Processor first; the local flip follows only if it agrees.
    if let Some(external_ref) = subscription.external_ref.as_deref() {
        state.processor.schedule_cancellation(external_ref).await?;
    }
    state.reconciler.mark_pending_cancellation(member.id).await?;

    status(State(state), headers).await
}

/// Undo a scheduled cancellation or resume a suspended subscription
/// whose paid period has not elapsed.
///
/// # Errors
///
/// 401 without an authenticated member, 404 without a subscription,
/// 409 when the paid period is over, 502 when the processor refuses.
pub async fn reactivate<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, ApiError>
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
    let member = current_member(&state.members, &headers).await?;
    let subscription = state
        .subscriptions
        .find_subscription(member.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subscription not found"))?;

    if subscription.status == SubscriptionStatus::PendingCancellation {
        if let Some(external_ref) = subscription.external_ref.as_deref() {
            state.processor.resume_subscription(external_ref).await?;
        }
    }
    state.reconciler.reactivate(member.id).await?;

    status(State(state), headers).await
}
