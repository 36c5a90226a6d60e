//! Payment processor webhook endpoint.

use crate::error::ApiError;
use crate::signature::{SignatureError, verify_signature};
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use cinetheque_core::CoreError;
use cinetheque_core::external::{CatalogResolver, IdentityDirectory, ProcessorClient};
use cinetheque_core::ingestion::{Ingested, ProcessorEvent};
use cinetheque_core::store::{
    DepositStore, MemberStore, PaymentStore, RegistryStore, SubscriptionStore,
};
use serde::Serialize;

/// Header carrying the processor's payload signature.
pub const SIGNATURE_HEADER: &str = "processor-signature";

/// Acknowledgement returned for every accepted delivery.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    /// Always `true` on a 200.
    pub received: bool,
    /// What processing did: `applied`, `already_applied` or `ignored`.
    pub outcome: &'static str,
}

const fn outcome_label(outcome: Ingested) -> &'static str {
    match outcome {
        Ingested::Applied => "applied",
        Ingested::AlreadyApplied => "already_applied",
        Ingested::Ignored => "ignored",
    }
}

/// Receive one signed processor event.
///
/// Returns 200 for every successfully processed delivery, including
/// recognized no-ops and unrecognized event types; 400 for malformed
/// payloads or signatures; 401 for failed verification; 409 when a
/// referenced local record is not yet visible, which tells the sender
/// to redeliver; 500 when a recognized event's side effects fail.
///
/// # Errors
///
/// See above; every failure is an [`ApiError`].
pub async fn receive<M, R, D, S, L, C, X, I>(
    State(state): State<AppState<M, R, D, S, L, C, X, I>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError>
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
    if state.webhook.allow_unverified {
        tracing::warn!("webhook signature verification is disabled");
    } else {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::bad_request("missing signature header"))?;

        let verified = verify_signature(
            &state.webhook.secret,
            &body,
            header,
            state.clock.now().timestamp(),
            state.webhook.tolerance_secs,
        )
        .map_err(|SignatureError::MalformedHeader| {
            ApiError::bad_request("malformed signature header")
        })?;

        if !verified {
            return Err(ApiError::unauthorized("webhook signature rejected"));
        }
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("webhook payload is not valid JSON"))?;
    let event = ProcessorEvent::from_json(&payload)?;

    match state.ingestor.ingest(&event).await {
        Ok(outcome) => Ok(Json(WebhookAck {
            received: true,
            outcome: outcome_label(outcome),
        })),
        // A referenced record that is still invisible after the bounded
        // retry: 409 tells the idempotent sender to redeliver.
        Err(CoreError::NotFound { entity }) => Err(ApiError::conflict(format!(
            "{entity} not yet visible, retry delivery"
        ))),
        Err(err @ (CoreError::Validation { .. } | CoreError::Conflict { .. })) => Err(err.into()),
        Err(err) => Err(ApiError::internal("event processing failed")
            .with_source(anyhow::anyhow!(err))),
    }
}
