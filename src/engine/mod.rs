// src/engine/mod.rs
// =============================================================================
// The batch engine: everything between "here is a list of names" and "here
// is a verdict for each of them".
//
// Submodules:
// - dispatcher: Worker pool, queue and result collection
// - limiter: Per-service request budgets
// - retry: Backoff decisions for failed lookups
// - cancel: Cancel switch shared with the caller
// =============================================================================

mod cancel;
mod dispatcher;
mod limiter;
mod retry;

pub use cancel::CancelToken;
pub use dispatcher::{Batch, DispatchOptions, Dispatcher, Mode, MAX_CONCURRENCY};
pub use limiter::{Permit, RateBudget, RateLimiter, Service};
pub use retry::{RetryDecision, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
