//! Admin member endpoints: deletion, orphan identity cleanup and
//! lifetime grants.

use crate::error::ApiError;
use crate::extract::require_admin;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use cinetheque_core::external::{CatalogResolver, IdentityDirectory, ProcessorClient};
use cinetheque_core::store::{
    DepositStore, MemberStore, PaymentStore, RegistryStore, SubscriptionStore,
};
use cinetheque_core::types::{MemberId, PlanId, Subscription};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Removal response.
#[derive(Debug, Serialize)]
pub struct RemovalResponse {
    /// Copies the departing member no longer custodies.
    pub redistributed: usize,
}

/// Delete a member: cancel billing, detach engagement rows,
/// redistribute copies, purge the profile and the auth identity.
///
/// # Errors
///
/// 403 without admin access, 404 for an unknown member, 502 when the
/// processor refuses the billing cancellation (nothing is removed).
pub async fn remove<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<RemovalResponse>, ApiError>
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
    require_admin(&state.members, &headers).await?;
    let report = state.removal.remove_member(MemberId(id)).await?;
    Ok(Json(RemovalResponse {
        redistributed: report.redistributed,
    }))
}

/// Clean up an auth identity that has no profile row, with the same
/// detachment and redistribution as a full member deletion.
///
/// # Errors
///
/// 403 without admin access, 502 when the processor refuses a
/// lingering billing cancellation.
pub async fn remove_orphan<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<RemovalResponse>, ApiError>
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
    require_admin(&state.members, &headers).await?;
    let report = state.removal.remove_orphan_identity(MemberId(id)).await?;
    Ok(Json(RemovalResponse {
        redistributed: report.redistributed,
    }))
}

/// Lifetime grant payload.
#[derive(Debug, Deserialize)]
pub struct LifetimeRequest {
    /// Plan to attach when the member has no subscription row yet.
    pub plan_id: Option<PlanId>,
}

/// Grant a member a lifetime subscription, cancelling any external
/// billing first.
///
/// # Errors
///
/// 400 when an unsubscribed member is granted without a plan, 403
/// without admin access, 502 when the processor refuses the
/// cancellation (the grant is aborted).
pub async fn grant_lifetime<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<LifetimeRequest>,
) -> Result<Json<Subscription>, ApiError>
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
    require_admin(&state.members, &headers).await?;
    state.members.get_member(MemberId(id)).await?;
    let subscription = state
        .reconciler
        .grant_lifetime(MemberId(id), request.plan_id)
        .await?;
    Ok(Json(subscription))
}
