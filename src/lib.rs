//! Check whether GitHub usernames, GitHub repository names and domain names
//! are still free.
//!
//! The [`engine::Dispatcher`] takes a [`engine::Batch`] of identifiers and a
//! [`checker::Checker`], fans the lookups out over a bounded set of workers
//! under a shared [`engine::RateLimiter`], retries what is worth retrying,
//! and hands back a [`outcome::ResultAggregate`] in input order.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nameprobe::checker::CheckKind;
//! use nameprobe::config::Settings;
//! use nameprobe::engine::{Batch, Dispatcher, RateLimiter};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = Settings::load()?;
//! let checker = CheckKind::GitHubUsername.build(&settings)?;
//! let limiter = Arc::new(RateLimiter::for_services(settings.is_authenticated()));
//!
//! let results = Dispatcher::new(checker, limiter)
//!     .run(&Batch::new(["octocat", "some-free-name-xyz"]))
//!     .await?;
//! for outcome in &results {
//!     println!("{}\t{}", outcome.identifier, outcome.verdict);
//! }
//! # Ok(())
//! # }
//! ```

pub mod checker;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod outcome;
pub mod telemetry;

pub use checker::{CheckContext, CheckKind, Checker};
pub use engine::{Batch, CancelToken, DispatchOptions, Dispatcher, Mode, RateLimiter, RetryPolicy};
pub use error::EngineError;
pub use outcome::{CheckOutcome, Diagnostic, DiagnosticKind, Progress, ResultAggregate, Verdict};
