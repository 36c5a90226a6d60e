//! PostgreSQL implementation of the Cinetheque ledger store.
//!
//! One [`PostgresLedger`] value implements every store trait from
//! `cinetheque-core`, backed by a single connection pool. Composite
//! operations (deposit completion, custody transfer, engagement
//! detachment) run inside explicit transactions with row locks, so
//! they are all-or-nothing the way the core's consistency contracts
//! require.
//!
//! # Example
//!
//! ```no_run
//! use cinetheque_postgres::PostgresLedger;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = PostgresLedger::connect("postgresql://localhost/cinetheque", 5).await?;
//! ledger.migrate().await?;
//! # Ok(())
//! # }
//! ```

use cinetheque_core::error::{CoreError, Result};
use cinetheque_core::types::{
    AcquisitionMethod, DepositStatus, PaymentRecordStatus, SubscriptionStatus, SupportKind,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

mod deposit;
mod member;
mod payment;
mod registry;
mod subscription;

/// PostgreSQL-backed ledger store.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect lazily with the given pool size.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the connection URL is malformed.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(url)
            .map_err(|e| CoreError::store(format!("failed to configure pool: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns `Store` if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::store(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool, for health checks.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub(crate) fn db_err(context: &str, err: sqlx::Error) -> CoreError {
    CoreError::store(format!("{context}: {err}"))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

// Stored enum columns are TEXT; a row that fails to parse means the
// database holds something this build does not know, which is a store
// fault rather than caller input.

pub(crate) fn parse_support(raw: &str) -> Result<SupportKind> {
    SupportKind::parse(raw).ok_or_else(|| CoreError::store(format!("unknown support `{raw}`")))
}

pub(crate) fn parse_method(raw: &str) -> Result<AcquisitionMethod> {
    AcquisitionMethod::parse(raw)
        .ok_or_else(|| CoreError::store(format!("unknown acquisition method `{raw}`")))
}

pub(crate) fn parse_deposit_status(raw: &str) -> Result<DepositStatus> {
    DepositStatus::parse(raw)
        .ok_or_else(|| CoreError::store(format!("unknown deposit status `{raw}`")))
}

pub(crate) fn parse_subscription_status(raw: &str) -> Result<SubscriptionStatus> {
    SubscriptionStatus::parse(raw)
        .ok_or_else(|| CoreError::store(format!("unknown subscription status `{raw}`")))
}

pub(crate) fn parse_payment_status(raw: &str) -> Result<PaymentRecordStatus> {
    PaymentRecordStatus::parse(raw)
        .ok_or_else(|| CoreError::store(format!("unknown payment status `{raw}`")))
}
