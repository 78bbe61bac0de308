//! Blocking helpers for waiting on one or many results.

use crate::core::error::CallError;
use crate::core::result::CallResult;
use crate::core::target::CallContext;

/// Join one result.
///
/// # Errors
///
/// The call's failure.
pub fn wait<R>(result: &CallResult<R>, ctx: &CallContext) -> Result<R, CallError>
where
    R: Clone + Send + 'static,
{
    result.join(ctx)
}

/// Join every result, in order, even after a failure.
///
/// # Errors
///
/// The first failure encountered.
pub fn wait_all<'a, R, I>(results: I, ctx: &CallContext) -> Result<(), CallError>
where
    R: Clone + Send + 'static,
    I: IntoIterator<Item = &'a CallResult<R>>,
{
    let mut first_error = None;
    for result in results {
        if let Err(e) = result.join(ctx) {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Join every result and collect the values in order.
///
/// # Errors
///
/// The first failure; later results are still joined.
pub fn collect_all<'a, R, I>(results: I, ctx: &CallContext) -> Result<Vec<R>, CallError>
where
    R: Clone + Send + 'static,
    I: IntoIterator<Item = &'a CallResult<R>>,
{
    let joined: Vec<_> = results.into_iter().map(|result| result.join(ctx)).collect();
    joined.into_iter().collect()
}
