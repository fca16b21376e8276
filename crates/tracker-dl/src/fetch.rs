use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::{
    error::{DownloadError, Result},
    http::HttpFetcher,
    oci::OciFetcher,
};

/// Retrieval scheme of a chart reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Oci,
}

impl Scheme {
    pub fn from_url(url: &Url) -> Result<Self> {
        match url.scheme() {
            "http" | "https" => Ok(Self::Http),
            "oci" => Ok(Self::Oci),
            other => Err(DownloadError::SchemeNotSupported(other.to_string())),
        }
    }
}

/// Basic credentials of a repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicAuth {
    pub user: String,
    pub pass: String,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            pass: pass.into(),
        }
    }

    /// Credentials only count when either part is set.
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.pass.is_empty()
    }

    /// Value for an `Authorization` header.
    pub fn header_value(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.user, self.pass));
        format!("Basic {encoded}")
    }
}

/// Per-call inputs shared by every fetcher.
#[derive(Clone, Copy)]
pub struct FetchContext<'a> {
    pub auth: Option<&'a BasicAuth>,
    pub cancel: &'a CancellationToken,
}

impl<'a> FetchContext<'a> {
    pub fn new(auth: Option<&'a BasicAuth>, cancel: &'a CancellationToken) -> Self {
        Self {
            auth: auth.filter(|a| !a.is_empty()),
            cancel,
        }
    }

    pub fn anonymous(cancel: &'a CancellationToken) -> Self {
        Self {
            auth: None,
            cancel,
        }
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        Ok(())
    }
}

/// A way of turning a chart URL into the archive bytes.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &Url, ctx: &FetchContext<'_>) -> Result<Vec<u8>>;
}

/// Dispatches chart retrieval to the fetcher matching the URL scheme.
pub struct Retriever {
    http: HttpFetcher,
    oci: OciFetcher,
}

impl Retriever {
    pub fn new(http: HttpFetcher, oci: OciFetcher) -> Self {
        Self {
            http,
            oci,
        }
    }

    /// The plain HTTP fetcher, used for logos and provenance probes.
    pub fn http(&self) -> &HttpFetcher {
        &self.http
    }

    pub fn retrieve(&self, url: &Url, ctx: &FetchContext<'_>) -> Result<Vec<u8>> {
        let scheme = Scheme::from_url(url)?;
        let fetcher: &dyn Fetcher = match scheme {
            Scheme::Http => &self.http,
            Scheme::Oci => &self.oci,
        };
        debug!(url = %url, ?scheme, "retrieving chart archive");
        fetcher.fetch(url, ctx)
    }
}
