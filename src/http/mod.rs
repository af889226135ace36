//! Resilient HTTP transport
//!
//! # Module Structure
//!
//! - [`retry`] - Retry policy engine and the retry stage
//! - [`middleware`] - Stage trait, pipeline and pipeline builder
//! - [`fault`], [`redirect`], [`compression`], [`user_agent`], [`headers`] - Remaining stages
//! - [`transport`] - reqwest client construction

pub mod compression;
pub mod fault;
pub mod headers;
pub mod middleware;
pub mod redirect;
pub mod retry;
pub mod transport;
pub mod user_agent;

pub use headers::{HeadersInspector, InspectedHeaders};
pub use middleware::{build, Middleware, MiddlewareFuture, MiddlewarePipeline, Next};
pub use retry::{Outcome, RetryDecision, RetryPolicy};
pub use transport::Transport;
