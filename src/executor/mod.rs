//! Runs bound methods against pooled connections.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::binding::{DecodedResult, MethodBinding, ScalarValue};
use crate::connection::pool::ConnectionPool;
use crate::core::{Context, ExecutionError, Result, Value};
use crate::result::FromRecord;

/// Applies the configured per-call timeout as a child deadline.
pub(crate) fn call_scope(ctx: &Context, timeout: Option<Duration>) -> Context {
    match timeout {
        Some(timeout) => ctx.with_timeout(timeout),
        None => ctx.clone(),
    }
}

/// Executes `MethodBinding`s.
///
/// Each call checks out one connection for a single round trip. A call that
/// loses the race against its `Context` discards that connection, since the
/// store may still be working on the abandoned statement.
#[derive(Clone)]
pub struct QueryExecutor {
    pool: Arc<ConnectionPool>,
    query_timeout: Option<Duration>,
}

impl QueryExecutor {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        let query_timeout = pool.config().query_timeout;
        Self {
            pool,
            query_timeout,
        }
    }

    pub async fn execute(
        &self,
        ctx: &Context,
        binding: &MethodBinding,
        args: &[Value],
    ) -> Result<DecodedResult> {
        ctx.check()?;
        check_arguments(binding, args)?;

        let ctx = call_scope(ctx, self.query_timeout);
        let mut guard = self.pool.acquire(&ctx).await?;

        debug!(
            table = binding.table(),
            method = binding.name(),
            sql = binding.sql(),
            params = args.len(),
            "executing bound method"
        );

        let outcome = ctx.run(guard.connection().query(binding.sql(), args)).await;
        let result = guard.settle(outcome)?;
        drop(guard);

        Ok(binding.decode_rule().decode(result)?)
    }

    /// Runs a scalar method and converts the value to `T`.
    pub async fn fetch_scalar<T>(&self, ctx: &Context, binding: &MethodBinding, args: &[Value]) -> Result<T>
    where
        T: TryFrom<ScalarValue, Error = ExecutionError>,
    {
        let scalar = self.execute(ctx, binding, args).await?.into_scalar()?;
        Ok(T::try_from(scalar)?)
    }

    pub async fn fetch_one<E: FromRecord>(
        &self,
        ctx: &Context,
        binding: &MethodBinding,
        args: &[Value],
    ) -> Result<Option<E>> {
        let record = self.execute(ctx, binding, args).await?.into_row()?;
        Ok(record.as_ref().map(E::from_record).transpose()?)
    }

    pub async fn fetch_all<E: FromRecord>(
        &self,
        ctx: &Context,
        binding: &MethodBinding,
        args: &[Value],
    ) -> Result<Vec<E>> {
        let records = self.execute(ctx, binding, args).await?.into_rows()?;
        Ok(records
            .iter()
            .map(E::from_record)
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

fn check_arguments(binding: &MethodBinding, args: &[Value]) -> std::result::Result<(), ExecutionError> {
    let parameters = binding.parameters();
    if parameters.len() != args.len() {
        return Err(ExecutionError::ArgumentMismatch(format!(
            "method '{}' expects {} argument(s), got {}",
            binding.name(),
            parameters.len(),
            args.len()
        )));
    }

    for (idx, (slot, arg)) in parameters.iter().zip(args).enumerate() {
        if !slot.semantic_type.is_compatible(arg) {
            return Err(ExecutionError::ArgumentMismatch(format!(
                "argument {} of method '{}' compares against {} column '{}' but is {}",
                idx + 1,
                binding.name(),
                slot.semantic_type,
                slot.column,
                arg.type_name()
            )));
        }
    }

    Ok(())
}
