//! Payment records, keyed by external reference.

use crate::{PostgresLedger, db_err, parse_payment_status};
use cinetheque_core::error::{CoreError, Result};
use cinetheque_core::store::PaymentStore;
use cinetheque_core::types::{
    MemberId, PaymentId, PaymentKind, PaymentRecord, PaymentRecordStatus, TitleId,
};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(FromRow)]
struct PaymentRow {
    id: Uuid,
    member_id: Uuid,
    kind: String,
    title_id: Option<Uuid>,
    external_ref: String,
    status: String,
    amount_cents: i64,
    created_at: DateTime<Utc>,
    settled_at: Option<DateTime<Utc>>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<PaymentRecord> {
        let kind = match (self.kind.as_str(), self.title_id) {
            ("one_off", Some(title_id)) => PaymentKind::OneOff {
                title_id: TitleId(title_id),
            },
            ("subscription", _) => PaymentKind::Subscription,
            (other, _) => {
                return Err(CoreError::store(format!("unknown payment kind `{other}`")));
            }
        };

        Ok(PaymentRecord {
            id: PaymentId(self.id),
            member_id: MemberId(self.member_id),
            kind,
            external_ref: self.external_ref,
            status: parse_payment_status(&self.status)?,
            amount_cents: self.amount_cents,
            created_at: self.created_at,
            settled_at: self.settled_at,
        })
    }
}

const fn kind_column(kind: PaymentKind) -> (&'static str, Option<TitleId>) {
    match kind {
        PaymentKind::OneOff { title_id } => ("one_off", Some(title_id)),
        PaymentKind::Subscription => ("subscription", None),
    }
}

const PAYMENT_COLUMNS: &str =
    "id, member_id, kind, title_id, external_ref, status, amount_cents, created_at, settled_at";

impl PaymentStore for PostgresLedger {
    async fn insert_payment_if_absent(&self, payment: &PaymentRecord) -> Result<bool> {
        let (kind, title_id) = kind_column(payment.kind);

        let result = sqlx::query(
            "INSERT INTO payments
                 (id, member_id, kind, title_id, external_ref, status, amount_cents,
                  created_at, settled_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (external_ref) DO NOTHING",
        )
        .bind(payment.id.0)
        .bind(payment.member_id.0)
        .bind(kind)
        .bind(title_id.map(|t| t.0))
        .bind(&payment.external_ref)
        .bind(payment.status.as_str())
        .bind(payment.amount_cents)
        .bind(payment.created_at)
        .bind(payment.settled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to insert payment", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_payment_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<PaymentRecord>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_ref = $1"
        ))
        .bind(external_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to find payment", e))?;

        row.map(PaymentRow::into_payment).transpose()
    }

    async fn settle_payment(
        &self,
        external_ref: &str,
        at: DateTime<Utc>,
    ) -> Result<(PaymentRecord, bool)> {
        // The status guard makes settlement idempotent: a replayed
        // event matches zero rows and falls through to the re-read.
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "UPDATE payments
             SET status = $2, settled_at = $3
             WHERE external_ref = $1 AND status <> $2
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(external_ref)
        .bind(PaymentRecordStatus::Settled.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to settle payment", e))?;

        if let Some(row) = row {
            return Ok((row.into_payment()?, true));
        }

        let existing = self
            .find_payment_by_external_ref(external_ref)
            .await?
            .ok_or(CoreError::not_found("PaymentRecord"))?;
        Ok((existing, false))
    }

    async fn fail_payment(&self, external_ref: &str) -> Result<PaymentRecord> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "UPDATE payments
             SET status = $2
             WHERE external_ref = $1
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(external_ref)
        .bind(PaymentRecordStatus::Failed.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to mark payment failed", e))?;

        row.ok_or(CoreError::not_found("PaymentRecord"))?.into_payment()
    }
}
