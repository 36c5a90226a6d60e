//! Subscription and plan rows.

use crate::{PostgresLedger, db_err, parse_subscription_status};
use cinetheque_core::error::{CoreError, Result};
use cinetheque_core::store::SubscriptionStore;
use cinetheque_core::types::{MemberId, Plan, PlanId, Subscription, SubscriptionId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(FromRow)]
struct SubscriptionRow {
    id: Uuid,
    member_id: Uuid,
    plan_id: Uuid,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    external_ref: Option<String>,
}

impl SubscriptionRow {
    fn into_subscription(self) -> Result<Subscription> {
        Ok(Subscription {
            id: SubscriptionId(self.id),
            member_id: MemberId(self.member_id),
            plan_id: PlanId(self.plan_id),
            started_at: self.started_at,
            expires_at: self.expires_at,
            status: parse_subscription_status(&self.status)?,
            external_ref: self.external_ref,
        })
    }
}

#[derive(FromRow)]
struct PlanRow {
    id: Uuid,
    name: String,
    duration_days: i64,
    external_price_ref: String,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Self {
            id: PlanId(row.id),
            name: row.name,
            duration_days: row.duration_days,
            external_price_ref: row.external_price_ref,
        }
    }
}

const SUBSCRIPTION_COLUMNS: &str =
    "id, member_id, plan_id, started_at, expires_at, status, external_ref";
const PLAN_COLUMNS: &str = "id, name, duration_days, external_price_ref";

impl SubscriptionStore for PostgresLedger {
    async fn find_subscription(&self, member: MemberId) -> Result<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE member_id = $1
             ORDER BY started_at DESC
             LIMIT 1"
        ))
        .bind(member.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to find subscription", e))?;

        row.map(SubscriptionRow::into_subscription).transpose()
    }

    async fn find_subscription_for_plan(
        &self,
        member: MemberId,
        plan: PlanId,
    ) -> Result<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
             WHERE member_id = $1 AND plan_id = $2"
        ))
        .bind(member.0)
        .bind(plan.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to find subscription", e))?;

        row.map(SubscriptionRow::into_subscription).transpose()
    }

    async fn find_subscription_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE external_ref = $1"
        ))
        .bind(external_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to find subscription", e))?;

        row.map(SubscriptionRow::into_subscription).transpose()
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            "INSERT INTO subscriptions
                 (id, member_id, plan_id, started_at, expires_at, status, external_ref)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(subscription.id.0)
        .bind(subscription.member_id.0)
        .bind(subscription.plan_id.0)
        .bind(subscription.started_at)
        .bind(subscription.expires_at)
        .bind(subscription.status.as_str())
        .bind(&subscription.external_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to insert subscription", e))?;
        Ok(())
    }

    async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        let result = sqlx::query(
            "UPDATE subscriptions
             SET plan_id = $2, started_at = $3, expires_at = $4, status = $5, external_ref = $6
             WHERE id = $1",
        )
        .bind(subscription.id.0)
        .bind(subscription.plan_id.0)
        .bind(subscription.started_at)
        .bind(subscription.expires_at)
        .bind(subscription.status.as_str())
        .bind(&subscription.external_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to update subscription", e))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Subscription"));
        }
        Ok(())
    }

    async fn extend_subscription(
        &self,
        id: SubscriptionId,
        candidate: DateTime<Utc>,
    ) -> Result<Subscription> {
        // GREATEST keeps the extension monotonic in a single atomic
        // statement, whatever order renewals land in.
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "UPDATE subscriptions
             SET expires_at = GREATEST(expires_at, $2)
             WHERE id = $1
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(id.0)
        .bind(candidate)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to extend subscription", e))?;

        row.ok_or(CoreError::not_found("Subscription"))?
            .into_subscription()
    }

    async fn delete_subscriptions_for_member(&self, member: MemberId) -> Result<()> {
        sqlx::query("DELETE FROM subscriptions WHERE member_id = $1")
            .bind(member.0)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("failed to delete subscriptions", e))?;
        Ok(())
    }

    async fn get_plan(&self, id: PlanId) -> Result<Plan> {
        let row: Option<PlanRow> =
            sqlx::query_as(&format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_err("failed to get plan", e))?;

        row.map(Plan::from).ok_or(CoreError::not_found("Plan"))
    }

    async fn find_plan_by_price_ref(&self, price_ref: &str) -> Result<Option<Plan>> {
        let row: Option<PlanRow> = sqlx::query_as(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE external_price_ref = $1"
        ))
        .bind(price_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to find plan", e))?;

        Ok(row.map(Plan::from))
    }

    async fn insert_plan(&self, plan: &Plan) -> Result<()> {
        sqlx::query(
            "INSERT INTO plans (id, name, duration_days, external_price_ref)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name,
                 duration_days = EXCLUDED.duration_days,
                 external_price_ref = EXCLUDED.external_price_ref",
        )
        .bind(plan.id.0)
        .bind(&plan.name)
        .bind(plan.duration_days)
        .bind(&plan.external_price_ref)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to insert plan", e))?;
        Ok(())
    }
}
