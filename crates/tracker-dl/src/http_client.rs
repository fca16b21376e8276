use std::time::Duration;

use ureq::{
    http::{self, Uri},
    typestate::WithoutBody,
    Agent, RequestBuilder,
};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    /// Creates a default ClientConfig with a `chart-tracker` user agent and a
    /// 30 second global timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use tracker_dl::http_client::ClientConfig;
    ///
    /// let cfg = ClientConfig::default();
    /// assert_eq!(cfg.user_agent.as_deref(), Some("chart-tracker"));
    /// ```
    fn default() -> Self {
        Self {
            user_agent: Some("chart-tracker".into()),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientConfig {
    /// Builds an HTTP `Agent` configured from this `ClientConfig`.
    ///
    /// Non-2xx responses are returned as regular responses rather than
    /// errors so callers can inspect the status code themselves.
    pub fn build(&self) -> Agent {
        let mut config = ureq::Agent::config_builder()
            .timeout_global(self.timeout)
            .http_status_as_error(false);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        config.build().into()
    }
}

/// HTTP client shared by every worker of the process.
///
/// Cloning is cheap: the underlying agent keeps its connection pool behind
/// an `Arc`, so clones share connections.
#[derive(Clone)]
pub struct HttpClient {
    agent: Agent,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            agent: config.build(),
        }
    }

    /// Create a GET request builder for the given URI.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tracker_dl::http_client::{ClientConfig, HttpClient};
    ///
    /// let client = HttpClient::new(&ClientConfig::default());
    /// let response = client.get("https://example.com").call();
    /// ```
    pub fn get<T>(&self, uri: T) -> RequestBuilder<WithoutBody>
    where
        Uri: TryFrom<T>,
        <Uri as TryFrom<T>>::Error: Into<http::Error>,
    {
        self.agent.get(uri)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}
