//! Member rows and engagement detachment.

use crate::{PostgresLedger, db_err, is_foreign_key_violation, is_unique_violation};
use cinetheque_core::error::{CoreError, Result};
use cinetheque_core::store::MemberStore;
use cinetheque_core::types::{Member, MemberId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(FromRow)]
struct MemberRow {
    id: Uuid,
    email: String,
    display_name: String,
    is_admin: bool,
    customer_ref: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Self {
            id: MemberId(row.id),
            email: row.email,
            display_name: row.display_name,
            is_admin: row.is_admin,
            customer_ref: row.customer_ref,
            created_at: row.created_at,
        }
    }
}

const MEMBER_COLUMNS: &str = "id, email, display_name, is_admin, customer_ref, created_at";

impl MemberStore for PostgresLedger {
    async fn get_member(&self, id: MemberId) -> Result<Member> {
        let row: Option<MemberRow> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to get member", e))?;

        row.map(Member::from).ok_or(CoreError::not_found("Member"))
    }

    async fn find_member_by_customer_ref(&self, customer_ref: &str) -> Result<Option<Member>> {
        let row: Option<MemberRow> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE customer_ref = $1"
        ))
        .bind(customer_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to find member by customer ref", e))?;

        Ok(row.map(Member::from))
    }

    async fn insert_member(&self, member: &Member) -> Result<()> {
        sqlx::query(
            "INSERT INTO members (id, email, display_name, is_admin, customer_ref, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(member.id.0)
        .bind(&member.email)
        .bind(&member.display_name)
        .bind(member.is_admin)
        .bind(&member.customer_ref)
        .bind(member.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::conflict("email already registered")
            } else {
                db_err("failed to insert member", e)
            }
        })?;
        Ok(())
    }

    async fn set_customer_ref(&self, id: MemberId, customer_ref: &str) -> Result<()> {
        let result = sqlx::query("UPDATE members SET customer_ref = $2 WHERE id = $1")
            .bind(id.0)
            .bind(customer_ref)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("failed to set customer ref", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Member"));
        }
        Ok(())
    }

    async fn list_members_except(&self, excluded: MemberId) -> Result<Vec<MemberId>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM members WHERE id <> $1 ORDER BY created_at, id",
        )
        .bind(excluded.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("failed to list members", e))?;

        Ok(ids.into_iter().map(|(id,)| MemberId(id)).collect())
    }

    async fn detach_engagements(&self, id: MemberId) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("failed to start transaction", e))?;

        sqlx::query("DELETE FROM likes WHERE member_id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("failed to detach likes", e))?;

        sqlx::query("DELETE FROM sponsorships WHERE sponsor_id = $1 OR sponsee_id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("failed to detach sponsorships", e))?;

        // Ending the member's sessions frees the copies they held.
        sqlx::query(
            "UPDATE registry_entries SET available = TRUE
             WHERE id IN (SELECT entry_id FROM viewing_sessions WHERE member_id = $1)",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("failed to release held copies", e))?;

        sqlx::query("DELETE FROM viewing_sessions WHERE member_id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("failed to end viewing sessions", e))?;

        tx.commit()
            .await
            .map_err(|e| db_err("failed to commit detachment", e))?;
        Ok(())
    }

    async fn delete_member(&self, id: MemberId) -> Result<()> {
        let result = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    CoreError::conflict("member still custodies registry entries")
                } else {
                    db_err("failed to delete member", e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Member"));
        }
        Ok(())
    }
}
