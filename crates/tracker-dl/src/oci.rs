use std::{collections::HashMap, str::FromStr};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use ureq::{
    http::{
        header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE},
        Response, StatusCode,
    },
    Body,
};
use url::Url;

use crate::{
    error::{DownloadError, Result},
    fetch::{BasicAuth, FetchContext, Fetcher},
    http::{read_body, MAX_BODY_SIZE},
    http_client::HttpClient,
};

pub const OCI_PREFIX: &str = "oci://";

pub const HELM_CHART_CONFIG_MEDIA_TYPE: &str = "application/vnd.cncf.helm.config.v1+json";
pub const HELM_CHART_CONTENT_LAYER_MEDIA_TYPE: &str = "application/tar+gzip";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    pub registry: String,
    pub repository: String,
    /// Tag or digest.
    pub reference: String,
}

impl FromStr for OciReference {
    type Err = DownloadError;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || DownloadError::InvalidReference(value.to_string());
        let path = value.strip_prefix(OCI_PREFIX).unwrap_or(value);

        let (registry, rest) = path.split_once('/').ok_or_else(invalid)?;
        if registry.is_empty() || rest.is_empty() {
            return Err(invalid());
        }

        // <repository>@<digest>
        if let Some((repository, digest)) = rest.split_once('@') {
            if repository.is_empty() || digest.is_empty() {
                return Err(invalid());
            }
            return Ok(Self {
                registry: registry.to_string(),
                repository: repository.to_string(),
                reference: digest.to_string(),
            });
        }

        // <repository>[:<tag>], the tag separator only counts in the last segment
        let (parent, name) = match rest.rsplit_once('/') {
            Some((parent, name)) => (Some(parent), name),
            None => (None, rest),
        };
        let (name, tag) = name.split_once(':').unwrap_or((name, "latest"));
        if name.is_empty() || tag.is_empty() {
            return Err(invalid());
        }
        let repository = match parent {
            Some(parent) => format!("{parent}/{name}"),
            None => name.to_string(),
        };

        Ok(Self {
            registry: registry.to_string(),
            repository,
            reference: tag.to_string(),
        })
    }
}

impl OciReference {
    /// Registry API root. Loopback registries are reached over plain HTTP.
    pub fn base_url(&self) -> String {
        let scheme = if is_loopback(&self.registry) {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://{}", self.registry)
    }

    pub fn manifest_url(&self) -> String {
        format!(
            "{}/v2/{}/manifests/{}",
            self.base_url(),
            self.repository,
            self.reference
        )
    }

    pub fn blob_url(&self, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.base_url(), self.repository, digest)
    }
}

fn is_loopback(registry: &str) -> bool {
    let host = if registry.starts_with('[') {
        registry
            .find(']')
            .map(|end| &registry[..=end])
            .unwrap_or(registry)
    } else {
        registry.split(':').next().unwrap_or(registry)
    };
    matches!(host, "localhost" | "127.0.0.1" | "[::1]")
}

#[derive(Debug, Clone, Deserialize)]
pub struct OciManifest {
    #[serde(default)]
    pub layers: Vec<OciDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OciDescriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

/// Pulled blobs keyed by digest.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn insert(&mut self, digest: impl Into<String>, data: Vec<u8>) {
        self.blobs.insert(digest.into(), data);
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.blobs.contains_key(digest)
    }

    pub fn get(&self, descriptor: &OciDescriptor) -> Option<&[u8]> {
        self.blobs.get(&descriptor.digest).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

/// Bytes of the first pulled layer carrying the chart content media type.
pub fn content_layer(layers: &[OciDescriptor], store: &MemoryStore) -> Result<Vec<u8>> {
    layers
        .iter()
        .filter(|layer| layer.media_type == HELM_CHART_CONTENT_LAYER_MEDIA_TYPE)
        .find_map(|layer| store.get(layer))
        .map(<[u8]>::to_vec)
        .ok_or(DownloadError::LayerNotFound)
}

#[derive(Debug, PartialEq, Eq)]
enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

fn parse_challenge(header: &str) -> Option<Challenge> {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let params = parse_challenge_params(params);
    Some(Challenge::Bearer {
        realm: params.get("realm")?.clone(),
        service: params.get("service").cloned(),
        scope: params.get("scope").cloned(),
    })
}

/// Parses `key="value",key=value` pairs; quoted values may contain commas.
fn parse_challenge_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while let Some((key, after)) = rest.split_once('=') {
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let after = after.trim_start();
        let (value, remaining) = match after.strip_prefix('"') {
            Some(quoted) => {
                match quoted.find('"') {
                    Some(end) => (&quoted[..end], &quoted[end + 1..]),
                    None => (quoted, ""),
                }
            }
            None => {
                match after.find(',') {
                    Some(end) => (&after[..end], &after[end..]),
                    None => (after, ""),
                }
            }
        };
        params.insert(key, value.to_string());
        rest = remaining.trim_start().trim_start_matches(',').trim_start();
    }

    params
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Authorization state of one pull.
struct AuthSession<'a> {
    creds: Option<&'a BasicAuth>,
    authorization: Option<String>,
}

/// Retrieval from OCI distribution registries.
pub struct OciFetcher {
    client: HttpClient,
}

impl OciFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
        }
    }

    /// Pulls the manifest of `reference` and every layer whose media type
    /// is in `allowed_media_types` into a fresh [`MemoryStore`].
    ///
    /// Returns the pulled layer descriptors in manifest order.
    pub fn pull(
        &self,
        reference: &OciReference,
        allowed_media_types: &[&str],
        ctx: &FetchContext<'_>,
    ) -> Result<(Vec<OciDescriptor>, MemoryStore)> {
        let mut session = AuthSession {
            creds: ctx.auth,
            authorization: None,
        };

        let manifest = self.fetch_manifest(reference, &mut session, ctx)?;
        let layers: Vec<OciDescriptor> = manifest
            .layers
            .into_iter()
            .filter(|layer| allowed_media_types.contains(&layer.media_type.as_str()))
            .collect();

        let mut store = MemoryStore::default();
        for layer in &layers {
            if store.contains(&layer.digest) {
                continue;
            }
            let data = self.fetch_blob(reference, layer, &mut session, ctx)?;
            store.insert(layer.digest.clone(), data);
        }

        Ok((layers, store))
    }

    fn fetch_manifest(
        &self,
        reference: &OciReference,
        session: &mut AuthSession<'_>,
        ctx: &FetchContext<'_>,
    ) -> Result<OciManifest> {
        let url = reference.manifest_url();
        let mut resp = self.authorized_get(&url, Some(MANIFEST_ACCEPT), session, ctx)?;
        resp.body_mut()
            .read_json()
            .map_err(|_| DownloadError::InvalidResponse)
    }

    fn fetch_blob(
        &self,
        reference: &OciReference,
        layer: &OciDescriptor,
        session: &mut AuthSession<'_>,
        ctx: &FetchContext<'_>,
    ) -> Result<Vec<u8>> {
        let url = reference.blob_url(&layer.digest);
        trace!(url = %url, media_type = %layer.media_type, "fetching blob");
        if layer.size > MAX_BODY_SIZE {
            return Err(DownloadError::TooLarge {
                limit: MAX_BODY_SIZE,
            });
        }

        let mut resp = self.authorized_get(&url, None, session, ctx)?;
        let data = read_body(resp.body_mut(), MAX_BODY_SIZE, ctx)?;
        if data.len() as u64 != layer.size {
            return Err(DownloadError::SizeMismatch {
                digest: layer.digest.clone(),
                expected: layer.size,
                actual: data.len() as u64,
            });
        }
        verify_digest(&layer.digest, &data)?;
        Ok(data)
    }

    /// GETs `url`, answering at most one authentication challenge.
    fn authorized_get(
        &self,
        url: &str,
        accept: Option<&str>,
        session: &mut AuthSession<'_>,
        ctx: &FetchContext<'_>,
    ) -> Result<Response<Body>> {
        let mut challenged = false;
        loop {
            ctx.check_cancelled()?;

            let mut req = self.client.get(url);
            if let Some(accept) = accept {
                req = req.header(ACCEPT, accept);
            }
            if let Some(value) = &session.authorization {
                req = req.header(AUTHORIZATION, value);
            }

            let resp = req.call()?;
            let status = resp.status();

            if status == StatusCode::UNAUTHORIZED {
                if challenged {
                    return Err(DownloadError::Unauthorized(url.to_string()));
                }
                challenged = true;

                let challenge = resp
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_challenge)
                    .ok_or_else(|| DownloadError::Unauthorized(url.to_string()))?;
                session.authorization = Some(self.authorize(&challenge, session.creds, ctx)?);
                continue;
            }

            if !status.is_success() {
                return Err(DownloadError::HttpError {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            return Ok(resp);
        }
    }

    fn authorize(
        &self,
        challenge: &Challenge,
        creds: Option<&BasicAuth>,
        ctx: &FetchContext<'_>,
    ) -> Result<String> {
        match challenge {
            Challenge::Basic => {
                creds.map(BasicAuth::header_value).ok_or_else(|| {
                    DownloadError::Unauthorized("registry requires credentials".into())
                })
            }
            Challenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let mut token_url = Url::parse(realm).map_err(|source| {
                    DownloadError::InvalidUrl {
                        url: realm.clone(),
                        source,
                    }
                })?;
                if service.is_some() || scope.is_some() {
                    let mut query = token_url.query_pairs_mut();
                    if let Some(service) = service {
                        query.append_pair("service", service);
                    }
                    if let Some(scope) = scope {
                        query.append_pair("scope", scope);
                    }
                }

                ctx.check_cancelled()?;
                debug!(realm = %realm, "requesting registry token");
                let mut req = self.client.get(token_url.as_str());
                if let Some(creds) = creds {
                    req = req.header(AUTHORIZATION, &creds.header_value());
                }
                let mut resp = req.call()?;
                if !resp.status().is_success() {
                    return Err(DownloadError::Unauthorized(format!(
                        "token endpoint answered {}",
                        resp.status().as_u16()
                    )));
                }

                let body: TokenResponse = resp
                    .body_mut()
                    .read_json()
                    .map_err(|_| DownloadError::InvalidResponse)?;
                let token = body
                    .token
                    .or(body.access_token)
                    .filter(|t| !t.is_empty())
                    .ok_or(DownloadError::InvalidResponse)?;
                Ok(format!("Bearer {token}"))
            }
        }
    }
}

impl Fetcher for OciFetcher {
    fn fetch(&self, url: &Url, ctx: &FetchContext<'_>) -> Result<Vec<u8>> {
        let reference: OciReference = url.as_str().parse()?;
        debug!(
            registry = %reference.registry,
            repository = %reference.repository,
            reference = %reference.reference,
            "pulling chart from registry"
        );

        let (layers, store) = self.pull(
            &reference,
            &[
                HELM_CHART_CONFIG_MEDIA_TYPE,
                HELM_CHART_CONTENT_LAYER_MEDIA_TYPE,
            ],
            ctx,
        )?;
        content_layer(&layers, &store)
    }
}

fn verify_digest(expected: &str, data: &[u8]) -> Result<()> {
    let Some(expected_hex) = expected.strip_prefix("sha256:") else {
        trace!(digest = expected, "skipping verification of non-sha256 digest");
        return Ok(());
    };

    let actual = hex::encode(Sha256::digest(data));
    if !actual.eq_ignore_ascii_case(expected_hex) {
        return Err(DownloadError::DigestMismatch {
            expected: expected.to_string(),
            actual: format!("sha256:{actual}"),
        });
    }
    Ok(())
}
