use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, Result};

/// A chart repository tracked by the ingestion pipeline.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Repository {
    /// Identifier reported alongside collected errors.
    /// Default: the repository name
    #[serde(default)]
    pub repository_id: String,

    /// Unique name of the repository.
    pub name: String,

    /// Base URL chart references are resolved against (http, https or oci).
    pub url: String,

    /// Basic auth user for the repository.
    pub auth_user: Option<String>,

    /// Basic auth password for the repository.
    pub auth_pass: Option<String>,
}

impl Repository {
    pub fn parsed_url(&self) -> Result<Url> {
        Url::parse(&self.url).map_err(|source| {
            ConfigError::InvalidRepositoryUrl {
                name: self.name.clone(),
                url: self.url.clone(),
                source,
            }
        })
    }

    pub fn has_auth(&self) -> bool {
        self.auth_user.as_deref().is_some_and(|u| !u.is_empty())
            || self.auth_pass.as_deref().is_some_and(|p| !p.is_empty())
    }
}
