//! Traits for the external collaborators at the system boundary.

use crate::error::Result;
use crate::types::{CatalogTitle, MemberId, Plan, TitleId};

/// Resolves catalog title ids against the movie metadata service.
pub trait CatalogResolver: Send + Sync {
    /// Resolve a catalog title id.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id does not resolve, `Store` on transport
    /// failure.
    fn resolve_title(&self, id: TitleId) -> impl Future<Output = Result<CatalogTitle>> + Send;
}

/// Client for the external payment processor's management API.
///
/// The processor's *event stream* drives ingestion; this trait covers
/// the few outbound calls the core makes, such as cancelling a billed
/// subscription before a lifetime grant commits.
pub trait ProcessorClient: Send + Sync {
    /// Start a hosted checkout for a plan and return its URL. The
    /// resulting subscription lands through the event stream, not
    /// through this call.
    ///
    /// # Errors
    ///
    /// `Processor` on any failure.
    fn create_checkout(
        &self,
        member: MemberId,
        plan: &Plan,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Cancel a subscription at the processor immediately.
    ///
    /// # Errors
    ///
    /// `Processor` on any failure; callers must abort their enclosing
    /// operation rather than partially commit local state.
    fn cancel_subscription(&self, external_ref: &str) -> impl Future<Output = Result<()>> + Send;

    /// Schedule cancellation at period end.
    ///
    /// # Errors
    ///
    /// `Processor` on any failure.
    fn schedule_cancellation(
        &self,
        external_ref: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Undo a scheduled cancellation.
    ///
    /// # Errors
    ///
    /// `Processor` on any failure.
    fn resume_subscription(&self, external_ref: &str) -> impl Future<Output = Result<()>> + Send;
}

/// The authentication layer's identity directory.
pub trait IdentityDirectory: Send + Sync {
    /// Delete the auth identity backing a member. Called only after
    /// inventory and billing are fully resolved.
    ///
    /// # Errors
    ///
    /// `Store` on transport failure, `NotFound` if the identity is
    /// already gone.
    fn delete_identity(&self, member: MemberId) -> impl Future<Output = Result<()>> + Send;
}
