//! Error types for tracker-core.

use miette::Diagnostic;
use thiserror::Error;
use tracker_dl::DownloadError;

/// Error type of collaborator services.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structural problems with a chart archive.
#[derive(Error, Diagnostic, Debug)]
pub enum ChartError {
    #[error("error reading chart archive: {0}")]
    #[diagnostic(
        code(tracker_core::chart::io),
        help("The archive must be a gzip compressed tarball")
    )]
    Io(#[from] std::io::Error),

    #[error("chart illegally contains content outside the base directory: {0}")]
    #[diagnostic(code(tracker_core::chart::outside_base_dir))]
    OutsideBaseDirectory(String),

    #[error("chart contains an illegal path: {0}")]
    #[diagnostic(code(tracker_core::chart::illegal_path))]
    IllegalPath(String),

    #[error("chart archive exceeds the maximum decompressed size of {limit} bytes")]
    #[diagnostic(code(tracker_core::chart::too_large))]
    TooLarge { limit: u64 },

    #[error("Chart.yaml file is missing")]
    #[diagnostic(
        code(tracker_core::chart::missing_chart_yaml),
        help("Every chart must carry a Chart.yaml at its root")
    )]
    MissingChartYaml,

    #[error("invalid Chart.yaml: {0}")]
    #[diagnostic(code(tracker_core::chart::invalid_chart_yaml))]
    InvalidChartYaml(#[from] serde_yaml::Error),

    #[error("validation: chart.metadata.{0} is required")]
    #[diagnostic(code(tracker_core::chart::missing_field))]
    MissingField(&'static str),

    #[error("invalid values.schema.json: {0}")]
    #[diagnostic(code(tracker_core::chart::invalid_schema))]
    InvalidSchema(#[from] serde_json::Error),
}

/// Malformed values of strictly parsed annotations.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("invalid links value: {0}")]
    #[diagnostic(code(tracker_core::annotations::links))]
    InvalidLinks(String),

    #[error("invalid maintainers value: {0}")]
    #[diagnostic(code(tracker_core::annotations::maintainers))]
    InvalidMaintainers(String),

    #[error("invalid operator value")]
    #[diagnostic(code(tracker_core::annotations::operator))]
    InvalidOperator,

    #[error("invalid prerelease value")]
    #[diagnostic(code(tracker_core::annotations::prerelease))]
    InvalidPrerelease,
}

#[derive(Error, Diagnostic, Debug)]
pub enum LogoError {
    #[error("invalid data url: {0}")]
    #[diagnostic(code(tracker_core::logo::data_url))]
    InvalidDataUrl(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Download(#[from] DownloadError),
}

#[derive(Error, Diagnostic, Debug)]
pub enum ImageStoreError {
    /// The bytes are not an image format the store recognizes.
    #[error("unknown image format")]
    #[diagnostic(code(tracker_core::image_store::unknown_format))]
    UnknownFormat,

    #[error("Error while {action}")]
    #[diagnostic(code(tracker_core::image_store::io))]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(tracker_core::image_store::other))]
    Other(BoxError),
}

/// Job-level failures, reported to the error collector.
#[derive(Error, Diagnostic, Debug)]
pub enum TrackerError {
    #[error("chart version has no urls")]
    #[diagnostic(code(tracker_core::no_chart_url))]
    NoChartUrl,

    #[error("invalid chart url {url}: {source}")]
    #[diagnostic(code(tracker_core::invalid_chart_url))]
    InvalidChartUrl {
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error("error loading chart ({url}): {source}")]
    #[diagnostic(code(tracker_core::retrieve))]
    Retrieve {
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error("error loading chart ({url}): {source}")]
    #[diagnostic(code(tracker_core::parse))]
    Parse {
        url: String,
        #[source]
        source: ChartError,
    },

    #[error("name and version in index ({name}:{version}) do not match chart content")]
    #[diagnostic(
        code(tracker_core::identity_mismatch),
        help("The repository index and the chart archive disagree")
    )]
    IdentityMismatch { name: String, version: String },

    #[error("error getting image {url}: {source}")]
    #[diagnostic(code(tracker_core::logo))]
    Logo {
        url: String,
        #[source]
        source: LogoError,
    },

    #[error("error saving image {url}: {source}")]
    #[diagnostic(code(tracker_core::save_image))]
    SaveImage {
        url: String,
        #[source]
        source: ImageStoreError,
    },

    #[error("error checking provenance file: {0}")]
    #[diagnostic(code(tracker_core::provenance))]
    Provenance(#[source] DownloadError),

    #[error("error enriching package: {0}")]
    #[diagnostic(code(tracker_core::enrich))]
    Enrich(#[from] AnnotationError),

    #[error("error registering package: {0}")]
    #[diagnostic(code(tracker_core::register))]
    Register(#[source] BoxError),

    #[error("error unregistering package: {0}")]
    #[diagnostic(code(tracker_core::unregister))]
    Unregister(#[source] BoxError),

    #[error("job panicked: {0}")]
    #[diagnostic(code(tracker_core::panic))]
    Panic(String),
}

impl TrackerError {
    /// Whether the error only reflects cancellation of the running job.
    pub fn is_cancelled(&self) -> bool {
        let download = match self {
            Self::InvalidChartUrl {
                source, ..
            }
            | Self::Retrieve {
                source, ..
            }
            | Self::Provenance(source) => Some(source),
            Self::Logo {
                source: LogoError::Download(source),
                ..
            } => Some(source),
            _ => None,
        };
        matches!(download, Some(DownloadError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_mismatch_message() {
        let err = TrackerError::IdentityMismatch {
            name: "nginx".into(),
            version: "1.0.0".into(),
        };
        assert_eq!(
            err.to_string(),
            "name and version in index (nginx:1.0.0) do not match chart content"
        );
    }

    #[test]
    fn test_retrieve_message_includes_cause() {
        let err = TrackerError::Retrieve {
            url: "https://example.com/a.tgz".into(),
            source: DownloadError::HttpError {
                status: 404,
                url: "https://example.com/a.tgz".into(),
            },
        };
        assert!(err.to_string().starts_with("error loading chart (https://example.com/a.tgz)"));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_is_cancelled() {
        let err = TrackerError::Retrieve {
            url: "oci://r/x:1".into(),
            source: DownloadError::Cancelled,
        };
        assert!(err.is_cancelled());

        let err = TrackerError::Logo {
            url: "https://example.com/logo.png".into(),
            source: LogoError::Download(DownloadError::Cancelled),
        };
        assert!(err.is_cancelled());

        assert!(!TrackerError::Enrich(AnnotationError::InvalidOperator).is_cancelled());
    }
}
