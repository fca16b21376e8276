#![allow(dead_code)]

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use flate2::{write::GzEncoder, Compression};
use tracker_core::{
    BoxError, ChartVersion, FsImageStore, KeywordLicenseDetector, MemoryErrorsCollector, Metadata,
    Package, PackageManager, Repository, Services,
};
use tracker_dl::{HttpClient, HttpFetcher, OciFetcher, Retriever, Unlimited};
use url::Url;

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0, 0, 0, 13];

/// Builds a gzip compressed tarball from `(path, content)` pairs.
pub fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, data.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Archive of a chart with a `Chart.yaml` made of `name`, `version` and
/// the extra YAML lines in `extra`.
pub fn chart_archive(name: &str, version: &str, extra: &str) -> Vec<u8> {
    let chart_yaml = format!("apiVersion: v2\nname: {name}\nversion: {version}\n{extra}");
    let chart_path = format!("{name}/Chart.yaml");
    let values_path = format!("{name}/values.yaml");
    archive(&[
        (chart_path.as_str(), chart_yaml.as_str()),
        (values_path.as_str(), "replicas: 1\n"),
    ])
}

pub fn chart_version(name: &str, version: &str, url: &str) -> ChartVersion {
    ChartVersion {
        metadata: Metadata {
            name: name.to_string(),
            version: version.to_string(),
            ..Default::default()
        },
        urls: vec![url.to_string()],
        ..Default::default()
    }
}

pub fn repository(url: &str) -> Repository {
    Repository::new("repo-1", "stable", Url::parse(url).unwrap())
}

/// Package manager remembering every call.
#[derive(Default)]
pub struct RecordingPackageManager {
    registered: Mutex<Vec<Package>>,
    unregistered: Mutex<Vec<Package>>,
    fail: bool,
}

impl RecordingPackageManager {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn registered(&self) -> Vec<Package> {
        self.registered.lock().unwrap().clone()
    }

    pub fn unregistered(&self) -> Vec<Package> {
        self.unregistered.lock().unwrap().clone()
    }
}

impl PackageManager for RecordingPackageManager {
    fn register(&self, package: &Package) -> Result<(), BoxError> {
        if self.fail {
            return Err("database unavailable".into());
        }
        self.registered.lock().unwrap().push(package.clone());
        Ok(())
    }

    fn unregister(&self, package: &Package) -> Result<(), BoxError> {
        if self.fail {
            return Err("database unavailable".into());
        }
        self.unregistered.lock().unwrap().push(package.clone());
        Ok(())
    }
}

pub struct Harness {
    pub pm: Arc<RecordingPackageManager>,
    pub ec: Arc<MemoryErrorsCollector>,
    pub services: Arc<Services>,
}

impl Harness {
    pub fn new(images: &Path) -> Self {
        Self::with_package_manager(images, RecordingPackageManager::default())
    }

    pub fn with_package_manager(images: &Path, pm: RecordingPackageManager) -> Self {
        let pm = Arc::new(pm);
        let ec = Arc::new(MemoryErrorsCollector::default());
        let client = HttpClient::default();
        let services = Arc::new(Services {
            retriever: Retriever::new(
                HttpFetcher::new(client.clone(), None, Arc::new(Unlimited)),
                OciFetcher::new(client),
            ),
            pm: pm.clone(),
            is: Arc::new(FsImageStore::new(images)),
            ld: Arc::new(KeywordLicenseDetector),
            ec: ec.clone(),
        });

        Self {
            pm,
            ec,
            services,
        }
    }
}
