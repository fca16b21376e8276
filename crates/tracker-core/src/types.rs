//! Data model shared by the parser, the enricher and the job handler.
//!
//! [`Metadata`] mirrors a `Chart.yaml` document, [`ChartVersion`] an entry
//! of a repository index, and [`Package`] the normalized record handed to
//! the registration service.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracker_dl::{BasicAuth, Scheme};
use url::Url;

/// Chart metadata as found in `Chart.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metadata {
    pub api_version: Option<String>,
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub home: Option<String>,
    pub icon: Option<String>,
    pub deprecated: bool,
    pub maintainers: Vec<ChartMaintainer>,
    pub sources: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub annotations: BTreeMap<String, String>,
    pub license: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChartMaintainer {
    pub name: String,
    pub email: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    pub repository: String,
}

/// A chart version listed by a repository index.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChartVersion {
    #[serde(flatten)]
    pub metadata: Metadata,

    /// Candidate archive locations; the first one is used.
    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default)]
    pub digest: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Register,
    Unregister,
}

/// Unit of work consumed by a worker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Job {
    pub kind: JobKind,
    pub chart_version: ChartVersion,

    /// Fetch the chart icon and save it through the image store.
    #[serde(default)]
    pub store_logo: bool,
}

impl Job {
    pub fn register(chart_version: ChartVersion) -> Self {
        Self {
            kind: JobKind::Register,
            chart_version,
            store_logo: false,
        }
    }

    pub fn unregister(chart_version: ChartVersion) -> Self {
        Self {
            kind: JobKind::Unregister,
            chart_version,
            store_logo: false,
        }
    }

    pub fn with_logo(mut self) -> Self {
        self.store_logo = true;
        self
    }
}

/// Source of the charts processed by one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub repository_id: String,
    pub name: String,
    pub url: Url,
    #[serde(skip)]
    pub auth: Option<BasicAuth>,
}

impl Repository {
    pub fn new(repository_id: impl Into<String>, name: impl Into<String>, url: Url) -> Self {
        Self {
            repository_id: repository_id.into(),
            name: name.into(),
            url,
            auth: None,
        }
    }

    /// Attaches basic credentials; empty credentials are ignored.
    pub fn with_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth).filter(|a| !a.is_empty());
        self
    }

    pub fn scheme(&self) -> Option<Scheme> {
        Scheme::from_url(&self.url).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Maintainer {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Link {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ContainerImage {
    pub name: String,
    pub image: String,
    pub whitelisted: bool,
}

/// Normalized record handed to the registration service.
///
/// Name, version and repository form the registration identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    /// Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub license: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_image_id: Option<String>,
    pub signed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub crds: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub crds_examples: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub containers_images: Vec<ContainerImage>,
    pub is_operator: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub capabilities: String,
    pub prerelease: bool,
    pub contains_security_updates: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
    pub repository: Repository,
}

impl Package {
    /// Package carrying only the registration identity.
    pub fn identity(name: impl Into<String>, version: impl Into<String>, repository: Repository) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            app_version: None,
            digest: String::new(),
            description: None,
            keywords: Vec::new(),
            home_url: None,
            content_url: None,
            created_at: None,
            deprecated: false,
            readme: None,
            license: String::new(),
            logo_url: None,
            logo_image_id: None,
            signed: false,
            maintainers: Vec::new(),
            links: Vec::new(),
            changes: Vec::new(),
            crds: Vec::new(),
            crds_examples: Vec::new(),
            containers_images: Vec::new(),
            is_operator: false,
            capabilities: String::new(),
            prerelease: false,
            contains_security_updates: false,
            values_schema: None,
            data: BTreeMap::new(),
            repository,
        }
    }
}
