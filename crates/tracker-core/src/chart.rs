//! Loading of packaged chart archives (`.tgz`).

use std::io::Read;

use flate2::read::GzDecoder;
use tracing::trace;

use crate::{error::ChartError, types::Metadata};

pub const CHART_FILE: &str = "Chart.yaml";
pub const SCHEMA_FILE: &str = "values.schema.json";
pub const README_FILE: &str = "README.md";
pub const LICENSE_FILE: &str = "LICENSE";

/// Upper bound for the decompressed size of an archive.
pub const MAX_DECOMPRESSED_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    /// Path relative to the chart root.
    pub name: String,
    pub data: Vec<u8>,
}

/// A parsed chart archive.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub metadata: Metadata,
    /// Every regular file of the chart except `Chart.yaml`, the values
    /// schema and subcharts, in archive order.
    pub files: Vec<ChartFile>,
    pub schema: Option<serde_json::Value>,
}

impl Chart {
    pub fn file(&self, name: &str) -> Option<&ChartFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

/// Parses a gzip compressed chart tarball.
///
/// Every entry must live under a top-level directory, which is stripped.
pub fn load_archive(data: &[u8]) -> Result<Chart, ChartError> {
    let decoder = GzDecoder::new(data).take(MAX_DECOMPRESSED_SIZE + 1);
    let mut archive = tar::Archive::new(decoder);

    let mut chart_yaml = None;
    let mut schema = None;
    let mut files = Vec::new();
    let mut total: u64 = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let name = strip_base_dir(&raw_path)?;

        // The declared size comes from an untrusted header.
        let remaining = MAX_DECOMPRESSED_SIZE - total;
        if entry.size() > remaining {
            return Err(ChartError::TooLarge {
                limit: MAX_DECOMPRESSED_SIZE,
            });
        }

        let mut data = Vec::with_capacity(entry.size() as usize);
        (&mut entry).take(remaining + 1).read_to_end(&mut data)?;
        total += data.len() as u64;
        if total > MAX_DECOMPRESSED_SIZE {
            return Err(ChartError::TooLarge {
                limit: MAX_DECOMPRESSED_SIZE,
            });
        }

        match name.as_str() {
            CHART_FILE => chart_yaml = Some(data),
            SCHEMA_FILE => schema = Some(data),
            n if n.starts_with("charts/") => {
                trace!(file = n, "skipping subchart file");
            }
            _ => {
                files.push(ChartFile {
                    name,
                    data,
                })
            }
        }
    }

    let chart_yaml = chart_yaml.ok_or(ChartError::MissingChartYaml)?;
    let metadata: Metadata = serde_yaml::from_slice(&chart_yaml)?;
    validate(&metadata)?;

    let schema = schema
        .map(|data| serde_json::from_slice(&data))
        .transpose()?;

    Ok(Chart {
        metadata,
        files,
        schema,
    })
}

/// Drops the top-level directory of an archive path and rejects paths that
/// could escape the chart root.
fn strip_base_dir(path: &str) -> Result<String, ChartError> {
    let path = path.trim_start_matches("./");
    let (_, rest) = path
        .split_once('/')
        .ok_or_else(|| ChartError::OutsideBaseDirectory(path.to_string()))?;

    if rest.is_empty() || rest.starts_with('/') || rest.split('/').any(|s| s == "..") {
        return Err(ChartError::IllegalPath(path.to_string()));
    }
    Ok(rest.to_string())
}

fn validate(metadata: &Metadata) -> Result<(), ChartError> {
    if metadata.name.trim().is_empty() {
        return Err(ChartError::MissingField("name"));
    }
    if metadata.version.trim().is_empty() {
        return Err(ChartError::MissingField("version"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use flate2::{write::GzEncoder, Compression};

    use super::*;

    /// Builds a gzip compressed tarball from `(path, content)` pairs.
    pub(crate) fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
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

    const CHART_YAML: &str = "apiVersion: v2
name: nginx
version: 1.2.3
appVersion: 1.25.0
description: Web server
keywords: [web, http]
home: https://nginx.org
sources:
  - https://github.com/nginx/nginx
maintainers:
  - name: ops
    email: ops@example.com
  - name: anonymous
dependencies:
  - name: common
    version: 2.x.x
    repository: https://charts.example.com
annotations:
  artifacthub.io/prerelease: \"true\"
";

    #[test]
    fn test_load_archive() {
        let data = archive(&[
            ("nginx/Chart.yaml", CHART_YAML),
            ("nginx/values.yaml", "replicas: 1\n"),
            ("nginx/README.md", "# nginx"),
            ("nginx/LICENSE", "MIT License"),
            ("nginx/templates/deployment.yaml", "kind: Deployment"),
            (
                "nginx/values.schema.json",
                r#"{"type": "object"}"#,
            ),
        ]);

        let chart = load_archive(&data).unwrap();
        assert_eq!(chart.metadata.name, "nginx");
        assert_eq!(chart.metadata.version, "1.2.3");
        assert_eq!(chart.metadata.keywords, vec!["web", "http"]);
        assert_eq!(chart.metadata.maintainers.len(), 2);
        assert_eq!(chart.metadata.dependencies[0].name, "common");
        assert_eq!(
            chart.metadata.annotations["artifacthub.io/prerelease"],
            "true"
        );

        let names: Vec<&str> = chart.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "values.yaml",
                "README.md",
                "LICENSE",
                "templates/deployment.yaml"
            ]
        );
        assert_eq!(chart.file(README_FILE).unwrap().data, b"# nginx");
        assert_eq!(chart.schema, Some(serde_json::json!({"type": "object"})));
    }

    #[test]
    fn test_subcharts_excluded() {
        let data = archive(&[
            ("app/Chart.yaml", "name: app\nversion: 0.1.0\n"),
            ("app/charts/dep/Chart.yaml", "name: dep\nversion: 1.0.0\n"),
            ("app/charts/dep/README.md", "dep readme"),
        ]);

        let chart = load_archive(&data).unwrap();
        assert_eq!(chart.metadata.name, "app");
        assert!(chart.files.is_empty());
        assert!(chart.schema.is_none());
    }

    #[test]
    fn test_missing_chart_yaml() {
        let data = archive(&[("app/values.yaml", "a: 1")]);
        assert!(matches!(
            load_archive(&data),
            Err(ChartError::MissingChartYaml)
        ));
    }

    #[test]
    fn test_missing_version() {
        let data = archive(&[("app/Chart.yaml", "name: app\n")]);
        let err = load_archive(&data).unwrap_err();
        assert_eq!(err.to_string(), "validation: chart.metadata.version is required");
    }

    #[test]
    fn test_content_outside_base_dir() {
        let data = archive(&[("Chart.yaml", "name: app\nversion: 0.1.0\n")]);
        assert!(matches!(
            load_archive(&data),
            Err(ChartError::OutsideBaseDirectory(_))
        ));
    }

    #[test]
    fn test_invalid_schema() {
        let data = archive(&[
            ("app/Chart.yaml", "name: app\nversion: 0.1.0\n"),
            ("app/values.schema.json", "{not json"),
        ]);
        assert!(matches!(
            load_archive(&data),
            Err(ChartError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_not_gzip() {
        assert!(matches!(
            load_archive(b"definitely not a tarball"),
            Err(ChartError::Io(_))
        ));
    }

    #[test]
    fn test_oversized_declared_entry_is_rejected_before_reading() {
        let mut header = tar::Header::new_gnu();
        header.set_path("app/Chart.yaml").unwrap();
        header.set_size(1 << 42);
        header.set_mode(0o644);
        header.set_cksum();

        let mut raw = header.as_bytes().to_vec();
        raw.extend_from_slice(&[b'a'; 1024]);
        raw.extend_from_slice(&[0; 1024]);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        std::io::Write::write_all(&mut encoder, &raw).unwrap();
        let data = encoder.finish().unwrap();

        assert!(matches!(
            load_archive(&data),
            Err(ChartError::TooLarge { limit: MAX_DECOMPRESSED_SIZE })
        ));
    }

    #[test]
    fn test_strip_base_dir() {
        assert_eq!(strip_base_dir("app/templates/a.yaml").unwrap(), "templates/a.yaml");
        assert_eq!(strip_base_dir("./app/Chart.yaml").unwrap(), "Chart.yaml");
        assert!(strip_base_dir("app/../etc/passwd").is_err());
        assert!(strip_base_dir("app/").is_err());
    }
}
