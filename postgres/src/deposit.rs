//! Deposit intake rows.

use crate::{PostgresLedger, db_err, parse_deposit_status, parse_support};
use cinetheque_core::error::{CoreError, Result};
use cinetheque_core::store::DepositStore;
use cinetheque_core::types::{Deposit, DepositId, DepositStatus, EntryId, MemberId, RegistryEntry};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(FromRow)]
struct DepositRow {
    id: Uuid,
    member_id: Uuid,
    declared_title: String,
    support: String,
    catalog_hint: Option<String>,
    tracking_code: String,
    status: String,
    rejection_reason: Option<String>,
    entry_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DepositRow {
    fn into_deposit(self) -> Result<Deposit> {
        Ok(Deposit {
            id: DepositId(self.id),
            member_id: MemberId(self.member_id),
            declared_title: self.declared_title,
            support: parse_support(&self.support)?,
            catalog_hint: self.catalog_hint,
            tracking_code: self.tracking_code,
            status: parse_deposit_status(&self.status)?,
            rejection_reason: self.rejection_reason,
            entry_id: self.entry_id.map(EntryId),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const DEPOSIT_COLUMNS: &str = "id, member_id, declared_title, support, catalog_hint, \
     tracking_code, status, rejection_reason, entry_id, created_at, updated_at";

impl DepositStore for PostgresLedger {
    async fn get_deposit(&self, id: DepositId) -> Result<Deposit> {
        let row: Option<DepositRow> = sqlx::query_as(&format!(
            "SELECT {DEPOSIT_COLUMNS} FROM deposits WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to get deposit", e))?;

        row.ok_or(CoreError::not_found("Deposit"))?.into_deposit()
    }

    async fn insert_deposit(&self, deposit: &Deposit) -> Result<()> {
        sqlx::query(
            "INSERT INTO deposits
                 (id, member_id, declared_title, support, catalog_hint, tracking_code,
                  status, rejection_reason, entry_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(deposit.id.0)
        .bind(deposit.member_id.0)
        .bind(&deposit.declared_title)
        .bind(deposit.support.as_str())
        .bind(&deposit.catalog_hint)
        .bind(&deposit.tracking_code)
        .bind(deposit.status.as_str())
        .bind(&deposit.rejection_reason)
        .bind(deposit.entry_id.map(|e| e.0))
        .bind(deposit.created_at)
        .bind(deposit.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to insert deposit", e))?;
        Ok(())
    }

    async fn deposits_for_member(&self, member: MemberId) -> Result<Vec<Deposit>> {
        let rows: Vec<DepositRow> = sqlx::query_as(&format!(
            "SELECT {DEPOSIT_COLUMNS} FROM deposits
             WHERE member_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(member.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("failed to list deposits", e))?;

        rows.into_iter().map(DepositRow::into_deposit).collect()
    }

    async fn deposits_in_status(&self, status: DepositStatus) -> Result<Vec<Deposit>> {
        let rows: Vec<DepositRow> = sqlx::query_as(&format!(
            "SELECT {DEPOSIT_COLUMNS} FROM deposits
             WHERE status = $1
             ORDER BY created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("failed to list deposits", e))?;

        rows.into_iter().map(DepositRow::into_deposit).collect()
    }

    async fn advance_deposit(
        &self,
        id: DepositId,
        from: DepositStatus,
        to: DepositStatus,
        rejection_reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Deposit> {
        // The status guard in the WHERE clause makes the transition a
        // single atomic check-and-set.
        let row: Option<DepositRow> = sqlx::query_as(&format!(
            "UPDATE deposits
             SET status = $3, rejection_reason = $4, updated_at = $5
             WHERE id = $1 AND status = $2
             RETURNING {DEPOSIT_COLUMNS}"
        ))
        .bind(id.0)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(rejection_reason)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to advance deposit", e))?;

        if let Some(row) = row {
            return row.into_deposit();
        }

        // Nothing matched: distinguish a missing deposit from one that
        // moved on since the caller looked.
        let current = self.get_deposit(id).await?;
        Err(CoreError::conflict(format!(
            "deposit is {}, expected {}",
            current.status.as_str(),
            from.as_str()
        )))
    }

    async fn complete_deposit(
        &self,
        id: DepositId,
        entry: &RegistryEntry,
        at: DateTime<Utc>,
    ) -> Result<Deposit> {
        let owner = entry
            .owner
            .ok_or_else(|| CoreError::validation("new registry entries require an owner"))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("failed to start transaction", e))?;

        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM deposits WHERE id = $1 FOR UPDATE")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_err("failed to lock deposit", e))?;

        let status = current.ok_or(CoreError::not_found("Deposit"))?.0;
        if !matches!(
            parse_deposit_status(&status)?,
            DepositStatus::Received | DepositStatus::Digitizing
        ) {
            return Err(CoreError::conflict(format!(
                "deposit is {status}, cannot complete"
            )));
        }

        sqlx::query(
            "INSERT INTO registry_entries
                 (id, title_id, support, owner_id, method, acquired_at, available, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id.0)
        .bind(entry.title_id.0)
        .bind(entry.support.as_str())
        .bind(owner.0)
        .bind(entry.method.as_str())
        .bind(entry.acquired_at)
        .bind(entry.available)
        .bind(&entry.notes)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("failed to insert entry", e))?;

        sqlx::query(
            "INSERT INTO ownership_transfers (entry_id, from_owner, to_owner, method, occurred_at)
             VALUES ($1, NULL, $2, $3, $4)",
        )
        .bind(entry.id.0)
        .bind(owner.0)
        .bind(entry.method.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("failed to append ledger row", e))?;

        let row: DepositRow = sqlx::query_as(&format!(
            "UPDATE deposits
             SET status = $2, entry_id = $3, updated_at = $4
             WHERE id = $1
             RETURNING {DEPOSIT_COLUMNS}"
        ))
        .bind(id.0)
        .bind(DepositStatus::Completed.as_str())
        .bind(entry.id.0)
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_err("failed to complete deposit", e))?;

        tx.commit()
            .await
            .map_err(|e| db_err("failed to commit deposit completion", e))?;

        row.into_deposit()
    }
}
