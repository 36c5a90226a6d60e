//! Copy registry and custody ledger rows.

use crate::{PostgresLedger, db_err, parse_method, parse_support};
use cinetheque_core::error::{CoreError, Result};
use cinetheque_core::store::RegistryStore;
use cinetheque_core::types::{
    AcquisitionMethod, EntryId, MemberId, OwnershipTransfer, RegistryEntry, TitleId,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

#[derive(FromRow)]
struct EntryRow {
    id: Uuid,
    title_id: Uuid,
    support: String,
    owner_id: Option<Uuid>,
    method: String,
    acquired_at: DateTime<Utc>,
    available: bool,
    notes: Option<String>,
}

impl EntryRow {
    fn into_entry(self) -> Result<RegistryEntry> {
        Ok(RegistryEntry {
            id: EntryId(self.id),
            title_id: TitleId(self.title_id),
            support: parse_support(&self.support)?,
            owner: self.owner_id.map(MemberId),
            method: parse_method(&self.method)?,
            acquired_at: self.acquired_at,
            available: self.available,
            notes: self.notes,
        })
    }
}

#[derive(FromRow)]
struct TransferRow {
    id: i64,
    entry_id: Uuid,
    from_owner: Option<Uuid>,
    to_owner: Uuid,
    method: String,
    occurred_at: DateTime<Utc>,
}

impl TransferRow {
    fn into_transfer(self) -> Result<OwnershipTransfer> {
        Ok(OwnershipTransfer {
            id: self.id,
            entry_id: EntryId(self.entry_id),
            from: self.from_owner.map(MemberId),
            to: MemberId(self.to_owner),
            method: parse_method(&self.method)?,
            occurred_at: self.occurred_at,
        })
    }
}

const ENTRY_COLUMNS: &str = "id, title_id, support, owner_id, method, acquired_at, available, notes";
const TRANSFER_COLUMNS: &str = "id, entry_id, from_owner, to_owner, method, occurred_at";

async fn append_transfer(
    tx: &mut Transaction<'_, Postgres>,
    entry_id: EntryId,
    from: Option<MemberId>,
    to: MemberId,
    method: AcquisitionMethod,
    at: DateTime<Utc>,
) -> Result<OwnershipTransfer> {
    let row: TransferRow = sqlx::query_as(&format!(
        "INSERT INTO ownership_transfers (entry_id, from_owner, to_owner, method, occurred_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {TRANSFER_COLUMNS}"
    ))
    .bind(entry_id.0)
    .bind(from.map(|m| m.0))
    .bind(to.0)
    .bind(method.as_str())
    .bind(at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| db_err("failed to append ledger row", e))?;

    row.into_transfer()
}

/// Lock the entry row for the duration of the transaction, so the
/// availability check and the mutation that follows cannot race with a
/// concurrent transfer or delete.
async fn lock_entry(tx: &mut Transaction<'_, Postgres>, id: EntryId) -> Result<EntryRow> {
    let row: Option<EntryRow> = sqlx::query_as(&format!(
        "SELECT {ENTRY_COLUMNS} FROM registry_entries WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.0)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| db_err("failed to lock entry", e))?;

    row.ok_or(CoreError::not_found("RegistryEntry"))
}

impl RegistryStore for PostgresLedger {
    async fn get_entry(&self, id: EntryId) -> Result<RegistryEntry> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM registry_entries WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to get entry", e))?;

        row.ok_or(CoreError::not_found("RegistryEntry"))?.into_entry()
    }

    async fn insert_entry(&self, entry: &RegistryEntry) -> Result<OwnershipTransfer> {
        let owner = entry
            .owner
            .ok_or_else(|| CoreError::validation("new registry entries require an owner"))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("failed to start transaction", e))?;

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

        let transfer =
            append_transfer(&mut tx, entry.id, None, owner, entry.method, entry.acquired_at)
                .await?;

        tx.commit()
            .await
            .map_err(|e| db_err("failed to commit entry insert", e))?;
        Ok(transfer)
    }

    async fn transfer_entry(
        &self,
        id: EntryId,
        to: MemberId,
        method: AcquisitionMethod,
        at: DateTime<Utc>,
    ) -> Result<OwnershipTransfer> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("failed to start transaction", e))?;

        let current = lock_entry(&mut tx, id).await?;
        if !current.available {
            return Err(CoreError::conflict(
                "copy is held by an active viewing session",
            ));
        }

        sqlx::query(
            "UPDATE registry_entries
             SET owner_id = $2, method = $3, acquired_at = $4
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(to.0)
        .bind(method.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("failed to update owner", e))?;

        let transfer =
            append_transfer(&mut tx, id, current.owner_id.map(MemberId), to, method, at).await?;

        tx.commit()
            .await
            .map_err(|e| db_err("failed to commit transfer", e))?;
        Ok(transfer)
    }

    async fn mark_entry_unassigned(&self, id: EntryId) -> Result<()> {
        let result = sqlx::query("UPDATE registry_entries SET owner_id = NULL WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("failed to mark entry unassigned", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("RegistryEntry"));
        }
        Ok(())
    }

    async fn delete_entry(&self, id: EntryId) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("failed to start transaction", e))?;

        let current = lock_entry(&mut tx, id).await?;
        if !current.available {
            return Err(CoreError::conflict(
                "copy is held by an active viewing session",
            ));
        }

        let (cascaded,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ownership_transfers WHERE entry_id = $1")
                .bind(id.0)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| db_err("failed to count ledger rows", e))?;

        sqlx::query("DELETE FROM registry_entries WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("failed to delete entry", e))?;

        tx.commit()
            .await
            .map_err(|e| db_err("failed to commit entry deletion", e))?;

        #[allow(clippy::cast_sign_loss)]
        Ok(cascaded as u64)
    }

    async fn entry_history(&self, id: EntryId) -> Result<Vec<OwnershipTransfer>> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM registry_entries WHERE id = $1)")
                .bind(id.0)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_err("failed to check entry", e))?;
        if !exists {
            return Err(CoreError::not_found("RegistryEntry"));
        }

        let rows: Vec<TransferRow> = sqlx::query_as(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM ownership_transfers
             WHERE entry_id = $1
             ORDER BY occurred_at, id"
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("failed to load history", e))?;

        rows.into_iter().map(TransferRow::into_transfer).collect()
    }

    async fn entries_owned_by(&self, member: MemberId) -> Result<Vec<RegistryEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM registry_entries
             WHERE owner_id = $1
             ORDER BY acquired_at, id"
        ))
        .bind(member.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("failed to load owned entries", e))?;

        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    async fn owns_title(&self, member: MemberId, title: TitleId) -> Result<bool> {
        let (owns,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(
                 SELECT 1 FROM registry_entries WHERE owner_id = $1 AND title_id = $2
             )",
        )
        .bind(member.0)
        .bind(title.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("failed to check title ownership", e))?;

        Ok(owns)
    }

    async fn set_entry_available(&self, id: EntryId, available: bool) -> Result<()> {
        let result = sqlx::query("UPDATE registry_entries SET available = $2 WHERE id = $1")
            .bind(id.0)
            .bind(available)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("failed to set availability", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("RegistryEntry"));
        }
        Ok(())
    }

    async fn grant_title(&self, member: MemberId, title: TitleId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO title_grants (member_id, title_id, granted_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (member_id, title_id) DO NOTHING",
        )
        .bind(member.0)
        .bind(title.0)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to grant title", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_entries(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM registry_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("failed to count entries", e))?;

        #[allow(clippy::cast_sign_loss)]
        Ok(count as u64)
    }
}
