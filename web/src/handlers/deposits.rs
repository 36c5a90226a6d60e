//! Deposit intake endpoints: member declaration plus the admin
//! receive / digitize / reject / complete actions.

use crate::error::ApiError;
use crate::extract::{current_member, require_admin};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use cinetheque_core::external::{CatalogResolver, IdentityDirectory, ProcessorClient};
use cinetheque_core::store::{
    DepositStore, MemberStore, PaymentStore, RegistryStore, SubscriptionStore,
};
use cinetheque_core::deposit::DepositDeclaration;
use cinetheque_core::types::{Deposit, DepositId, DepositStatus, EntryId, SupportKind, TitleId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Member-facing declaration payload.
#[derive(Debug, Deserialize)]
pub struct DeclareRequest {
    /// Film title as written by the member.
    pub declared_title: String,
    /// Declared physical support.
    pub support: SupportKind,
    /// Optional hint for catalog matching.
    pub catalog_hint: Option<String>,
    /// Carrier tracking code.
    pub tracking_code: String,
}

/// Declare an inbound shipment. Returns 201 with the new deposit.
///
/// # Errors
///
/// 401 without an authenticated member, 400 on blank fields.
pub async fn declare<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Json(request): Json<DeclareRequest>,
) -> Result<(StatusCode, Json<Deposit>), ApiError>
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
    let deposit = state
        .deposits
        .declare(
            member.id,
            DepositDeclaration {
                declared_title: request.declared_title,
                support: request.support,
                catalog_hint: request.catalog_hint,
                tracking_code: request.tracking_code,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(deposit)))
}

/// The authenticated member's own deposits, newest first.
///
/// # Errors
///
/// 401 without an authenticated member.
pub async fn list_own<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Deposit>>, ApiError>
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
    let deposits = state.deposits.for_member(member.id).await?;
    Ok(Json(deposits))
}

/// Filter for the admin deposit listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Status to filter on; defaults to `sent`.
    pub status: Option<String>,
}

/// Admin listing of deposits in a given status.
///
/// # Errors
///
/// 403 without admin access, 400 on an unknown status.
pub async fn list<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Deposit>>, ApiError>
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
    let raw = query.status.as_deref().unwrap_or("sent");
    let status = DepositStatus::parse(raw)
        .ok_or_else(|| ApiError::bad_request(format!("unknown deposit status `{raw}`")))?;
    let deposits = state.deposits.in_status(status).await?;
    Ok(Json(deposits))
}

/// Admin confirms physical receipt.
///
/// # Errors
///
/// 403 without admin access, 404 or 409 from the workflow.
pub async fn receive<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Deposit>, ApiError>
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
    let deposit = state.deposits.receive(DepositId(id)).await?;
    Ok(Json(deposit))
}

/// Admin sends the disc to digitization.
///
/// # Errors
///
/// 403 without admin access, 404 or 409 from the workflow.
pub async fn digitize<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Deposit>, ApiError>
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
    let deposit = state.deposits.start_digitizing(DepositId(id)).await?;
    Ok(Json(deposit))
}

/// Rejection payload.
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    /// Why the deposit is refused. Must not be blank.
    pub reason: String,
}

/// Admin refuses the deposit.
///
/// # Errors
///
/// 400 on a blank reason, 403 without admin access, 404 or 409 from
/// the workflow.
pub async fn reject<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<Deposit>, ApiError>
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
    let deposit = state.deposits.reject(DepositId(id), &request.reason).await?;
    Ok(Json(deposit))
}

/// Completion payload: the catalog title the admin matched.
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    /// Resolved catalog title id.
    pub title_id: TitleId,
}

/// Completion response.
#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    /// The completed deposit.
    pub deposit: Deposit,
    /// The registry entry the disc became.
    pub entry_id: EntryId,
}

/// Admin matches the disc to a catalog title and admits it into the
/// registry.
///
/// # Errors
///
/// 400 when the catalog id does not resolve, 403 without admin
/// access, 404 or 409 from the workflow.
pub async fn complete<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError>
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
    let (deposit, entry_id) = state.deposits.complete(DepositId(id), request.title_id).await?;
    Ok(Json(CompleteResponse { deposit, entry_id }))
}
