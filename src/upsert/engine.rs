use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::batch::Batch;
use super::policy::ConflictPolicy;
use super::statement::{self, Statement};
use crate::connection::pool::{ConnectionPool, PoolGuard};
use crate::core::{Context, Error, Result};
use crate::executor::call_scope;

/// Applies batches with a conflict policy.
///
/// A batch becomes one or more `INSERT ... ON CONFLICT` statements. When it
/// needs more than one, they run in a single transaction so the batch lands
/// entirely or not at all.
#[derive(Clone)]
pub struct UpsertEngine {
    pool: Arc<ConnectionPool>,
    max_rows_per_statement: usize,
    query_timeout: Option<Duration>,
}

impl UpsertEngine {
    pub const DEFAULT_MAX_ROWS_PER_STATEMENT: usize = 1000;

    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        let query_timeout = pool.config().query_timeout;
        Self {
            pool,
            max_rows_per_statement: Self::DEFAULT_MAX_ROWS_PER_STATEMENT,
            query_timeout,
        }
    }

    pub fn max_rows_per_statement(mut self, rows: usize) -> Self {
        self.max_rows_per_statement = rows.max(1);
        self
    }

    /// Returns the number of rows the store reports as inserted or updated.
    /// Rows skipped by `DO NOTHING` are not counted.
    pub async fn upsert(&self, ctx: &Context, batch: Batch, policy: &ConflictPolicy) -> Result<u64> {
        policy.validate(batch.table())?;
        if batch.is_empty() {
            return Ok(0);
        }
        ctx.check()?;

        let statements = statement::plan(
            batch.table(),
            policy,
            batch.rows(),
            self.max_rows_per_statement,
        );

        let ctx = call_scope(ctx, self.query_timeout);
        let mut guard = self.pool.acquire(&ctx).await?;

        debug!(
            table = batch.table().name(),
            rows = batch.len(),
            statements = statements.len(),
            "upserting batch"
        );

        if let [single] = statements.as_slice() {
            return Self::run(&ctx, &mut guard, single).await;
        }

        let outcome = ctx.run(guard.connection().begin()).await;
        guard.settle(outcome)?;

        let mut affected = 0;
        for statement in &statements {
            match Self::run(&ctx, &mut guard, statement).await {
                Ok(rows) => affected += rows,
                Err(err) => {
                    Self::abort(&mut guard, &err).await;
                    return Err(err);
                }
            }
        }

        // The transaction either commits as a whole or is abandoned here.
        if let Some(err) = ctx.err() {
            let err = Error::from(err);
            Self::abort(&mut guard, &err).await;
            return Err(err);
        }
        if let Err(err) = guard.connection().commit().await {
            guard.discard();
            return Err(err);
        }

        Ok(affected)
    }

    async fn run(ctx: &Context, guard: &mut PoolGuard, statement: &Statement) -> Result<u64> {
        debug!(
            sql = %statement.sql,
            rows = statement.rows,
            params = statement.params.len(),
            "executing upsert statement"
        );
        let outcome = ctx
            .run(guard.connection().execute(&statement.sql, &statement.params))
            .await;
        guard.settle(outcome)
    }

    /// Rolls back after a failed statement. An interrupted round trip has
    /// already discarded the connection; closing it aborts the transaction.
    async fn abort(guard: &mut PoolGuard, cause: &Error) {
        if cause.is_cancelled() {
            guard.discard();
            warn!(error = %cause, "upsert interrupted, abandoning transaction");
            return;
        }

        warn!(error = %cause, "upsert failed, rolling back");
        if let Err(err) = guard.connection().rollback().await {
            warn!(error = %err, "rollback failed");
            guard.discard();
        }
    }
}
