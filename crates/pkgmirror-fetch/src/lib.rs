//! HTTP fetching for the mirror crawler.
//!
//! # Architecture
//!
//! - [`HttpClient`] - injected transport; [`ReqwestClient`] is the production one
//! - [`BoundedFetcher`] - fixed request-slot pool, results drained in completion order
//! - [`FetchTask`] / [`FetchResult`] - transient request/response pairs
//!
//! The fetcher never retries. Non-2xx statuses and transport errors come back
//! as ordinary results and retry policy stays with the caller.

mod bounded;
mod error;
mod http;
mod task;

pub use bounded::BoundedFetcher;
pub use error::{FetchError, Result};
pub use http::{ClientSettings, HttpClient, HttpResponse};
pub use task::{FetchResult, FetchTask};

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
