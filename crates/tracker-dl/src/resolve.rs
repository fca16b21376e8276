use url::Url;

use crate::error::{DownloadError, Result};

/// Resolves a chart reference against the repository base URL.
///
/// Absolute references are returned as they are. Relative references take
/// the scheme, host and port of `base`; a relative path is appended to the
/// base path, while a path starting with `/` replaces it.
///
/// # Examples
///
/// ```
/// use tracker_dl::resolve::resolve_reference;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/charts").unwrap();
/// let url = resolve_reference(&base, "nginx-1.0.0.tgz").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/charts/nginx-1.0.0.tgz");
/// ```
pub fn resolve_reference(base: &Url, reference: &str) -> Result<Url> {
    match Url::parse(reference) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let (path, query) = match reference.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (reference, None),
            };
            let path = if path.starts_with('/') {
                path.to_string()
            } else {
                join_paths(base.path(), path)
            };

            let mut resolved = base.clone();
            resolved.set_path(&path);
            resolved.set_query(query);
            resolved.set_fragment(None);
            Ok(resolved)
        }
        Err(source) => {
            Err(DownloadError::InvalidUrl {
                url: reference.to_string(),
                source,
            })
        }
    }
}

/// Joins two slash separated paths and cleans `.` and `..` segments.
fn join_paths(base: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(relative.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_absolute_reference_unchanged() {
        let url = resolve_reference(
            &base("https://example.com/charts"),
            "https://cdn.example.org/nginx-1.0.0.tgz",
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.org/nginx-1.0.0.tgz");
    }

    #[test]
    fn test_relative_reference_appended_to_base_path() {
        let b = base("https://user.github.io/helm-charts/");
        let url = resolve_reference(&b, "packages/nginx-1.0.0.tgz").unwrap();
        assert_eq!(url.scheme(), b.scheme());
        assert_eq!(url.host_str(), b.host_str());
        assert_eq!(url.path(), "/helm-charts/packages/nginx-1.0.0.tgz");
    }

    #[test]
    fn test_relative_reference_base_without_trailing_slash() {
        let url = resolve_reference(&base("http://localhost:8080/stable"), "nginx.tgz").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/stable/nginx.tgz");
    }

    #[test]
    fn test_rooted_reference_keeps_its_path() {
        let url = resolve_reference(&base("https://example.com/charts"), "/dl/nginx.tgz").unwrap();
        assert_eq!(url.as_str(), "https://example.com/dl/nginx.tgz");
    }

    #[test]
    fn test_relative_reference_keeps_query() {
        let url = resolve_reference(&base("https://example.com/repo"), "nginx.tgz?sig=abc").unwrap();
        assert_eq!(url.path(), "/repo/nginx.tgz");
        assert_eq!(url.query(), Some("sig=abc"));
    }

    #[test]
    fn test_relative_reference_dot_segments() {
        let url = resolve_reference(&base("https://example.com/a/b"), "../c/./x.tgz").unwrap();
        assert_eq!(url.path(), "/a/c/x.tgz");
    }

    #[test]
    fn test_base_query_is_dropped() {
        let url = resolve_reference(&base("https://example.com/repo?token=1"), "x.tgz").unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_invalid_reference() {
        let err = resolve_reference(&base("https://example.com"), "http://[::1").unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl { .. }));
    }
}
