use std::{io::Read, sync::Arc};

use tracing::trace;
use ureq::{
    http::{header::AUTHORIZATION, StatusCode},
    Body,
};
use url::Url;

use crate::{
    error::{DownloadError, Result},
    fetch::{FetchContext, Fetcher},
    http_client::HttpClient,
    ratelimit::RateLimiter,
};

/// Hosts whose requests are authenticated with the configured token and
/// passed through the shared rate limiter.
pub const GITHUB_HOSTS: [&str; 2] = ["github.com", "raw.githubusercontent.com"];

/// Upper bound for a response body read into memory.
pub const MAX_BODY_SIZE: u64 = 256 * 1024 * 1024;

/// Size of the buffer a response body is read through.
const READ_CHUNK_SIZE: usize = 64 * 1024;

pub fn is_github_host(url: &Url) -> bool {
    url.host_str()
        .map(|host| GITHUB_HOSTS.contains(&host))
        .unwrap_or(false)
}

/// Reads at most `limit` bytes of `body`, checking for cancellation
/// between chunks.
pub(crate) fn read_body(body: &mut Body, limit: u64, ctx: &FetchContext<'_>) -> Result<Vec<u8>> {
    let mut reader = body.with_config().limit(limit).reader();
    let mut data = Vec::new();
    let mut chunk = vec![0; READ_CHUNK_SIZE];
    loop {
        ctx.check_cancelled()?;
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Ok(data);
        }
        data.extend_from_slice(&chunk[..n]);
    }
}

/// Plain HTTP(S) retrieval.
pub struct HttpFetcher {
    client: HttpClient,
    github_token: Option<String>,
    github_rl: Arc<dyn RateLimiter>,
}

impl HttpFetcher {
    pub fn new(
        client: HttpClient,
        github_token: Option<String>,
        github_rl: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            client,
            github_token: github_token.filter(|t| !t.is_empty()),
            github_rl,
        }
    }

    /// GETs `url` and returns the body of a `200 OK` response.
    pub fn get(&self, url: &Url, ctx: &FetchContext<'_>) -> Result<Vec<u8>> {
        ctx.check_cancelled()?;

        let mut req = self.client.get(url.as_str());
        if let Some(value) = self.authorization(url, ctx)? {
            req = req.header(AUTHORIZATION, value);
        }

        trace!(url = %url, "sending request");
        let mut resp = req.call()?;
        if resp.status() != StatusCode::OK {
            return Err(DownloadError::HttpError {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }

        read_body(resp.body_mut(), MAX_BODY_SIZE, ctx)
    }

    /// Authorization header value for a GET of `url`.
    ///
    /// Code-hosting hosts get the configured token and consume one rate
    /// limiter token first; repository credentials, when present, take
    /// precedence over the token.
    fn authorization(&self, url: &Url, ctx: &FetchContext<'_>) -> Result<Option<String>> {
        let mut authorization = None;
        if is_github_host(url) {
            authorization = self.github_token.as_ref().map(|t| format!("token {t}"));
            self.github_rl.wait(ctx.cancel)?;
        }
        if let Some(auth) = ctx.auth {
            authorization = Some(auth.header_value());
        }
        Ok(authorization)
    }

    /// Reports whether `url` answers `200 OK`, sending only the repository
    /// credentials.
    pub fn exists(&self, url: &Url, ctx: &FetchContext<'_>) -> Result<bool> {
        ctx.check_cancelled()?;

        let mut req = self.client.get(url.as_str());
        if let Some(auth) = ctx.auth {
            req = req.header(AUTHORIZATION, &auth.header_value());
        }
        let resp = req.call()?;
        Ok(resp.status() == StatusCode::OK)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url, ctx: &FetchContext<'_>) -> Result<Vec<u8>> {
        self.get(url, ctx)
    }
}
