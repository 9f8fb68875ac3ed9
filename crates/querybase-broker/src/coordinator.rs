//! Approval coordinator (C8, §4.8): a thin event-emitting wrapper around
//! the metadata store's approval operations.

use querybase_core::entities::{Approval, Comment, Review, ReviewDecision};
use querybase_core::ids::{ApprovalId, CommentId, PrincipalId};
use querybase_error::RuntimeError;
use querybase_events::{EventBus, EventPayload};
use querybase_store::{ApprovalCounts, ApprovalFilter, MetadataStore};

/// Detail view combining an approval with its reviews (§4.8 "detail fetch
/// including embedded reviews").
#[derive(Debug, Clone)]
pub struct ApprovalDetail {
    pub approval: Approval,
    pub reviews: Vec<Review>,
}

/// Wraps the approval half of the metadata store with the event
/// emission §4.8 requires of every status transition.
#[derive(Clone)]
pub struct ApprovalCoordinator {
    store: MetadataStore,
    events: EventBus,
}

impl ApprovalCoordinator {
    /// Build a coordinator over an already-connected store and event bus.
    #[must_use]
    pub fn new(store: MetadataStore, events: EventBus) -> Self {
        Self { store, events }
    }

    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn list(&self, filter: &ApprovalFilter, page: i64, per_page: i64) -> Result<Vec<Approval>, RuntimeError> {
        self.store.list_approvals(filter, page, per_page).await
    }

    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn counts(&self) -> Result<ApprovalCounts, RuntimeError> {
        self.store.approval_counts().await
    }

    /// # Errors
    ///
    /// Returns `not_found` if no such approval exists.
    pub async fn detail(&self, id: ApprovalId) -> Result<ApprovalDetail, RuntimeError> {
        let approval = self.store.get_approval(id).await?;
        let reviews = self.store.reviews_for_approval(id).await?;
        Ok(ApprovalDetail { approval, reviews })
    }

    /// Record a review and emit `approval_status_changed` (§4.8).
    ///
    /// # Errors
    ///
    /// Returns `invalid_state` if the approval is not `pending`.
    pub async fn add_review(
        &self,
        approval_id: ApprovalId,
        reviewer: PrincipalId,
        decision: ReviewDecision,
        comments: Option<&str>,
    ) -> Result<Review, RuntimeError> {
        let review = self.store.add_review(approval_id, reviewer, decision, comments).await?;

        let new_status = match decision {
            ReviewDecision::Approved => "approved",
            ReviewDecision::Rejected => "rejected",
        };
        self.events.publish(EventPayload::ApprovalStatusChanged {
            approval_id,
            new_status: new_status.to_string(),
        });
        Ok(review)
    }

    /// # Errors
    ///
    /// Returns `invalid_input` if `body` is outside `1..5000` chars.
    pub async fn add_comment(&self, approval: ApprovalId, author: PrincipalId, body: &str) -> Result<Comment, RuntimeError> {
        self.store.add_comment(approval, author, body).await
    }

    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn list_comments(&self, approval: ApprovalId) -> Result<Vec<Comment>, RuntimeError> {
        self.store.list_comments(approval).await
    }

    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn delete_comment(&self, id: CommentId) -> Result<(), RuntimeError> {
        self.store.delete_comment(id).await
    }

    /// Called by C7 after persisting a new approval (§4.7 step 3);
    /// emits `approval_created` (§4.8).
    pub fn notify_created(&self, approval_id: ApprovalId) {
        self.events.publish(EventPayload::ApprovalCreated { approval_id });
    }
}
