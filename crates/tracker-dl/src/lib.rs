//! Chart archive retrieval for the chart tracker.
//!
//! Archives are fetched either over plain HTTP(S) or from OCI distribution
//! registries. Every network call takes a [`FetchContext`] carrying the
//! repository credentials and the cancellation token of the running job.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio_util::sync::CancellationToken;
//! use tracker_dl::{
//!     FetchContext, HttpClient, HttpFetcher, OciFetcher, Retriever, TokenBucket,
//! };
//! use url::Url;
//!
//! let client = HttpClient::default();
//! let retriever = Retriever::new(
//!     HttpFetcher::new(client.clone(), None, Arc::new(TokenBucket::per_hour(5000, 10))),
//!     OciFetcher::new(client),
//! );
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("oci://ghcr.io/org/charts/nginx:1.0.0").unwrap();
//! let archive = retriever.retrieve(&url, &FetchContext::anonymous(&cancel));
//! ```

pub mod error;
pub mod fetch;
pub mod http;
pub mod http_client;
pub mod oci;
pub mod ratelimit;
pub mod resolve;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{DownloadError, Result};
pub use fetch::{BasicAuth, FetchContext, Fetcher, Retriever, Scheme};
pub use http::HttpFetcher;
pub use http_client::{ClientConfig, HttpClient};
pub use oci::{OciFetcher, OciReference};
pub use ratelimit::{RateLimiter, TokenBucket, Unlimited};
pub use resolve::resolve_reference;
