use base64::{engine::general_purpose::STANDARD, Engine as _};
use percent_encoding::percent_decode_str;
use tracker_dl::{DownloadError, FetchContext, HttpFetcher, Scheme};
use url::Url;

use crate::error::LogoError;

/// Returns the image bytes referenced by a chart icon.
///
/// `data:` URLs are decoded in place; anything else is downloaded over
/// HTTP without repository credentials.
pub fn fetch_logo(
    http: &HttpFetcher,
    icon: &str,
    ctx: &FetchContext<'_>,
) -> Result<Vec<u8>, LogoError> {
    if icon.starts_with("data:") {
        return decode_data_url(icon);
    }

    let url = Url::parse(icon).map_err(|source| {
        DownloadError::InvalidUrl {
            url: icon.to_string(),
            source,
        }
    })?;
    if Scheme::from_url(&url)? != Scheme::Http {
        return Err(DownloadError::SchemeNotSupported(url.scheme().to_string()).into());
    }
    Ok(http.get(&url, ctx)?)
}

/// Decodes an RFC 2397 `data:` URL.
///
/// # Examples
///
/// ```
/// use tracker_core::logo::decode_data_url;
///
/// let data = decode_data_url("data:image/png;base64,aGVsbG8=").unwrap();
/// assert_eq!(data, b"hello");
/// ```
pub fn decode_data_url(value: &str) -> Result<Vec<u8>, LogoError> {
    let invalid = || LogoError::InvalidDataUrl(truncate(value));

    let rest = value.strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let is_base64 = header
        .rsplit(';')
        .next()
        .is_some_and(|p| p.trim().eq_ignore_ascii_case("base64"));

    if is_base64 {
        let payload: String = percent_decode_str(payload)
            .decode_utf8()
            .map_err(|_| invalid())?
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        STANDARD.decode(payload).map_err(|_| invalid())
    } else {
        Ok(percent_decode_str(payload).collect())
    }
}

fn truncate(value: &str) -> String {
    const MAX: usize = 64;
    match value.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}
