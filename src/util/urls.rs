use thiserror::Error;
use url::Url;

/// Errors raised when a catalog publication URL cannot be turned into a
/// site query host.
#[derive(Debug, Error)]
pub enum UrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Derive the host used in a site-restricted provider query from a
/// publication URL.
///
/// The scheme and path are discarded; a leading `www.` is stripped so the
/// query matches the whole site rather than one subdomain. The host is
/// lowercased.
///
/// Fails fast on URLs that cannot name a site: unparseable strings,
/// non-HTTP schemes, and host-less URLs.
pub fn site_host(url_str: &str) -> Result<String, UrlError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?;
    let host = host.to_ascii_lowercase();
    Ok(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Leniently extract the lowercased host from a result link.
///
/// Unlike [`site_host`] this never fails: links that do not parse or have
/// no host yield `None` and the caller decides what to do with the item.
/// The `www.` prefix is stripped so result links map onto the same keys
/// that [`site_host`] produces for catalog URLs.
pub fn extract_host(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}
