//! Admin registry endpoints: manual entry creation, custody transfer,
//! irreversible deletion and custody history.

use crate::error::ApiError;
use crate::extract::require_admin;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use cinetheque_core::external::{CatalogResolver, IdentityDirectory, ProcessorClient};
use cinetheque_core::store::{
    DepositStore, MemberStore, PaymentStore, RegistryStore, SubscriptionStore,
};
use cinetheque_core::types::{
    AcquisitionMethod, EntryId, MemberId, OwnershipTransfer, RegistryEntry, SupportKind, TitleId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Manual entry creation payload.
#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    /// Catalog title of the copy.
    pub title_id: TitleId,
    /// Member who custodies the copy.
    pub owner_id: MemberId,
    /// Physical support.
    pub support: SupportKind,
    /// How the owner acquired it; defaults to `exchange`.
    pub method: Option<AcquisitionMethod>,
    /// Free-form admin notes.
    pub notes: Option<String>,
}

/// Create a registry entry by hand. Returns 201 with the entry.
///
/// # Errors
///
/// 403 without admin access.
pub async fn create<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Json(request): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<RegistryEntry>), ApiError>
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
    let (entry, _) = state
        .registry
        .create_entry(
            request.title_id,
            request.owner_id,
            request.support,
            request.method.unwrap_or(AcquisitionMethod::Exchange),
            request.notes,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Custody transfer payload.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// New custodian.
    pub to_owner: MemberId,
    /// Kind of custody change; defaults to `exchange`.
    pub method: Option<AcquisitionMethod>,
}

/// Move custody of a copy to another member.
///
/// # Errors
///
/// 403 without admin access, 409 while the copy is in a viewing
/// session, 404 for an unknown entry.
pub async fn transfer<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<OwnershipTransfer>, ApiError>
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
    let transfer = state
        .registry
        .transfer(
            EntryId(id),
            request.to_owner,
            request.method.unwrap_or(AcquisitionMethod::Exchange),
        )
        .await?;
    Ok(Json(transfer))
}

/// Deletion confirmation; the warning is returned until `confirm=true`
/// is passed.
#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    /// Explicit confirmation of the irreversible deletion.
    pub confirm: Option<bool>,
}

/// Deletion response.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Deleted entry id.
    pub entry_id: EntryId,
    /// Ledger rows removed by the cascade.
    pub cascaded_transfers: u64,
}

/// Delete a copy and its custody history.
///
/// Deletion cascades the entry's full transfer ledger and cannot be
/// undone, so it is refused with an explicit warning until the caller
/// passes `confirm=true`.
///
/// # Errors
///
/// 400 without confirmation, 403 without admin access, 409 while the
/// copy is in a viewing session, 404 for an unknown entry.
pub async fn delete<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>, ApiError>
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

    if query.confirm != Some(true) {
        return Err(ApiError::bad_request(
            "deleting a copy also deletes its entire custody history and cannot be undone; \
             pass confirm=true to proceed",
        ));
    }

    let cascaded = state.registry.delete(EntryId(id)).await?;
    Ok(Json(DeleteResponse {
        entry_id: EntryId(id),
        cascaded_transfers: cascaded,
    }))
}

/// Full custody history of a copy, oldest first.
///
/// # Errors
///
/// 403 without admin access, 404 for an unknown entry.
pub async fn history<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OwnershipTransfer>>, ApiError>
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
    let history = state.registry.history(EntryId(id)).await?;
    Ok(Json(history))
}
