use querybase_core::entities::{Approval, ApprovalStatus, Comment, Review, ReviewDecision, StatementKind};
use querybase_core::ids::{ApprovalId, BackendId, CommentId, PrincipalId, ReviewId};
use querybase_error::RuntimeError;
use uuid::Uuid;

use crate::rows::{approval_status_str, kind_str, review_decision_str, ApprovalRow, CommentRow, ReviewRow};
use crate::{map_db_err, MetadataStore};

/// Filters accepted by `list_approvals` (§4.8).
#[derive(Debug, Clone, Default)]
pub struct ApprovalFilter {
    pub status: Option<ApprovalStatus>,
    pub backend: Option<BackendId>,
    pub requester: Option<PrincipalId>,
}

/// Counts grouped by status (§4.8).
#[derive(Debug, Clone, Default)]
pub struct ApprovalCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

impl MetadataStore {
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn create_approval(
        &self,
        principal_requested: PrincipalId,
        backend: BackendId,
        text: &str,
        kind: StatementKind,
    ) -> Result<Approval, RuntimeError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO approvals (id, principal_requested, backend_id, text, kind, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'pending', now())",
        )
        .bind(id)
        .bind(principal_requested.as_uuid())
        .bind(backend.as_uuid())
        .bind(text)
        .bind(kind_str(kind))
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;

        self.get_approval(ApprovalId::from(id)).await
    }

    /// # Errors
    ///
    /// Returns `not_found` if no such approval exists.
    pub async fn get_approval(&self, id: ApprovalId) -> Result<Approval, RuntimeError> {
        let row: ApprovalRow = sqlx::query_as(
            "SELECT id, principal_requested, backend_id, text, kind, status, rejection_reason, \
             created_at, completed_at FROM approvals WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| RuntimeError::not_found(format!("approval {id}")))?;

        Ok(row.into())
    }

    /// List with filters and pagination (§4.8).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn list_approvals(&self, filter: &ApprovalFilter, page: i64, per_page: i64) -> Result<Vec<Approval>, RuntimeError> {
        let status = filter.status.map(approval_status_str);
        let rows: Vec<ApprovalRow> = sqlx::query_as(
            "SELECT id, principal_requested, backend_id, text, kind, status, rejection_reason, \
             created_at, completed_at FROM approvals \
             WHERE ($1::text IS NULL OR status = $1) \
               AND ($2::uuid IS NULL OR backend_id = $2) \
               AND ($3::uuid IS NULL OR principal_requested = $3) \
             ORDER BY created_at DESC OFFSET $4 LIMIT $5",
        )
        .bind(status)
        .bind(filter.backend.map(|b| b.as_uuid()))
        .bind(filter.requester.map(|p| p.as_uuid()))
        .bind((page.max(1) - 1) * per_page)
        .bind(per_page)
        .fetch_all(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn approval_counts(&self) -> Result<ApprovalCounts, RuntimeError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            status: String,
            count: i64,
        }
        let rows: Vec<Row> = sqlx::query_as("SELECT status, COUNT(*) AS count FROM approvals GROUP BY status")
            .fetch_all(self.pool())
            .await
            .map_err(map_db_err)?;

        let mut counts = ApprovalCounts::default();
        for row in rows {
            match row.status.as_str() {
                "pending" => counts.pending = row.count,
                "approved" => counts.approved = row.count,
                "rejected" => counts.rejected = row.count,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Add a review, enforcing the `pending`-only precondition (§4.8)
    /// with a conditional update so concurrent reviewers race safely
    /// (§5 "concurrent reviews race on the metadata store's conditional
    /// update").
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
        let mut tx = self.pool().begin().await.map_err(map_db_err)?;

        let new_status = approval_status_str(match decision {
            ReviewDecision::Approved => ApprovalStatus::Approved,
            ReviewDecision::Rejected => ApprovalStatus::Rejected,
        });
        let rejection_reason = matches!(decision, ReviewDecision::Rejected)
            .then(|| comments.unwrap_or_default().to_string());

        let updated = sqlx::query(
            "UPDATE approvals SET status = $2, rejection_reason = $3, completed_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(approval_id.as_uuid())
        .bind(new_status)
        .bind(rejection_reason)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        if updated.rows_affected() == 0 {
            return Err(RuntimeError::invalid_state("approval is not pending"));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO reviews (id, approval_id, reviewer_id, decision, comments, at) \
             VALUES ($1, $2, $3, $4, $5, now())",
        )
        .bind(id)
        .bind(approval_id.as_uuid())
        .bind(reviewer.as_uuid())
        .bind(review_decision_str(decision))
        .bind(comments)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        let row: ReviewRow = sqlx::query_as(
            "SELECT id, approval_id, reviewer_id, decision, comments, at FROM reviews WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn reviews_for_approval(&self, approval: ApprovalId) -> Result<Vec<Review>, RuntimeError> {
        let rows: Vec<ReviewRow> = sqlx::query_as(
            "SELECT id, approval_id, reviewer_id, decision, comments, at FROM reviews \
             WHERE approval_id = $1 ORDER BY at",
        )
        .bind(approval.as_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `invalid_input` if `body` is outside `1..5000` chars.
    pub async fn add_comment(&self, approval: ApprovalId, author: PrincipalId, body: &str) -> Result<Comment, RuntimeError> {
        if body.is_empty() || body.chars().count() > 5000 {
            return Err(RuntimeError::invalid_input("comment body must be 1..5000 chars"));
        }
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO comments (id, approval_id, author_id, body, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, now(), now())",
        )
        .bind(id)
        .bind(approval.as_uuid())
        .bind(author.as_uuid())
        .bind(body)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;

        let row: CommentRow = sqlx::query_as(
            "SELECT id, approval_id, author_id, body, created_at, updated_at FROM comments WHERE id = $1",
        )
        .bind(id)
        .fetch_one(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn list_comments(&self, approval: ApprovalId) -> Result<Vec<Comment>, RuntimeError> {
        let rows: Vec<CommentRow> = sqlx::query_as(
            "SELECT id, approval_id, author_id, body, created_at, updated_at FROM comments \
             WHERE approval_id = $1 ORDER BY created_at",
        )
        .bind(approval.as_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Hard delete, author or admin only (§4.13); capability checking is
    /// the caller's responsibility (C6).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn delete_comment(&self, id: CommentId) -> Result<(), RuntimeError> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    /// Hard delete a review.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn delete_review(&self, id: ReviewId) -> Result<(), RuntimeError> {
        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }
}
