use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DownloadError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(tracker_dl::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    #[diagnostic(
        code(tracker_dl::network),
        help("Check that the remote host is reachable")
    )]
    Network(#[from] Box<ureq::Error>),

    #[error("unexpected status code received: {status} ({url})")]
    #[diagnostic(code(tracker_dl::http_error))]
    HttpError { status: u16, url: String },

    #[error(transparent)]
    #[diagnostic(code(tracker_dl::io))]
    Io(#[from] std::io::Error),

    #[error("scheme not supported: {0}")]
    #[diagnostic(
        code(tracker_dl::scheme_not_supported),
        help("Supported schemes are http, https and oci")
    )]
    SchemeNotSupported(String),

    #[error("Invalid OCI reference: {0}")]
    #[diagnostic(
        code(tracker_dl::invalid_reference),
        help("Expected oci://<registry>/<repository>[:<tag>|@<digest>]")
    )]
    InvalidReference(String),

    #[error("content layer not found")]
    #[diagnostic(code(tracker_dl::layer_not_found))]
    LayerNotFound,

    #[error("Digest mismatch for blob {expected}: got {actual}")]
    #[diagnostic(code(tracker_dl::digest_mismatch))]
    DigestMismatch { expected: String, actual: String },

    #[error("Size mismatch for blob {digest}: expected {expected} bytes, got {actual}")]
    #[diagnostic(code(tracker_dl::size_mismatch))]
    SizeMismatch {
        digest: String,
        expected: u64,
        actual: u64,
    },

    #[error("Response exceeds {limit} bytes")]
    #[diagnostic(code(tracker_dl::too_large))]
    TooLarge { limit: u64 },

    #[error("Invalid response from server")]
    #[diagnostic(code(tracker_dl::invalid_response))]
    InvalidResponse,

    #[error("Registry authentication failed: {0}")]
    #[diagnostic(
        code(tracker_dl::unauthorized),
        help("Check the repository credentials")
    )]
    Unauthorized(String),

    #[error("Operation cancelled")]
    #[diagnostic(code(tracker_dl::cancelled))]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl From<ureq::Error> for DownloadError {
    /// Converts a `ureq::Error` into a `DownloadError::Network` variant.
    fn from(e: ureq::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

impl DownloadError {
    /// Status code carried by the error, if it came from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpError {
                status, ..
            } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_invalid_url() {
        let err = DownloadError::InvalidUrl {
            url: "invalid".to_string(),
            source: url::ParseError::RelativeUrlWithoutBase,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid URL"));
        assert!(msg.contains("invalid"));
    }

    #[test]
    fn test_download_error_http_error() {
        let err = DownloadError::HttpError {
            status: 404,
            url: "https://example.com/notfound".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("404"));
        assert!(msg.contains("https://example.com/notfound"));
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_download_error_layer_not_found() {
        let err = DownloadError::LayerNotFound;
        assert_eq!(format!("{}", err), "content layer not found");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_download_error_scheme_not_supported() {
        let err = DownloadError::SchemeNotSupported("ftp".into());
        assert_eq!(format!("{}", err), "scheme not supported: ftp");
    }

    #[test]
    fn test_from_ureq_error() {
        let ureq_err = ureq::Error::ConnectionFailed;
        let download_err: DownloadError = ureq_err.into();

        match download_err {
            DownloadError::Network(_) => (),
            _ => panic!("Expected Network error variant"),
        }
    }

    #[test]
    fn test_error_source_chain() {
        let err = DownloadError::InvalidUrl {
            url: "::".to_string(),
            source: url::ParseError::EmptyHost,
        };

        assert!(std::error::Error::source(&err).is_some());
    }
}
