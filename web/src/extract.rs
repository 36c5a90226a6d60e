//! Identity resolution for handlers.
//!
//! Authentication terminates at the fronting proxy, which injects the
//! verified member id as a request header. Handlers resolve that id
//! against the member store and authorize from the stored admin flag.

use crate::error::ApiError;
use axum::http::HeaderMap;
use cinetheque_core::CoreError;
use cinetheque_core::store::MemberStore;
use cinetheque_core::types::{Member, MemberId};
use uuid::Uuid;

/// Header carrying the authenticated member id.
pub const MEMBER_HEADER: &str = "x-member-id";

/// Resolve the authenticated member, or fail with 401.
///
/// # Errors
///
/// `401` when the header is missing, malformed or names no member;
/// store failures map through [`ApiError`].
pub async fn current_member<M: MemberStore>(
    members: &M,
    headers: &HeaderMap,
) -> Result<Member, ApiError> {
    let raw = headers
        .get(MEMBER_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing member identity"))?;

    let id = Uuid::parse_str(raw)
        .map_err(|_| ApiError::unauthorized("malformed member identity"))?;

    match members.get_member(MemberId(id)).await {
        Ok(member) => Ok(member),
        Err(CoreError::NotFound { .. }) => Err(ApiError::unauthorized("unknown member identity")),
        Err(other) => Err(other.into()),
    }
}

/// Resolve the authenticated member and require the admin flag.
///
/// # Errors
///
/// `401` as [`current_member`], `403` for non-admin members.
pub async fn require_admin<M: MemberStore>(
    members: &M,
    headers: &HeaderMap,
) -> Result<Member, ApiError> {
    let member = current_member(members, headers).await?;
    if !member.is_admin {
        return Err(ApiError::forbidden("admin access required"));
    }
    Ok(member)
}
