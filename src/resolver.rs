#![forbid(unsafe_code)]

//! Turns profile URLs into [`CollectionHandle`]s. Purely syntactic: nothing
//! here touches the network or checks that the profile exists.

use crate::error::ResolveError;
use crate::model::CollectionHandle;
use url::Url;

pub const DEFAULT_PLATFORM_DOMAIN: &str = "instagram.com";

/// The platform whose profile URLs we accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    domain: String,
}

impl Platform {
    pub fn new(domain: &str) -> Self {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        let domain = domain.strip_prefix("www.").unwrap_or(&domain).to_string();
        Self { domain }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// True for the bare domain and any of its subdomains.
    pub fn owns_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        host == self.domain
            || host
                .strip_suffix(&self.domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new(DEFAULT_PLATFORM_DOMAIN)
    }
}

/// Extracts the profile handle from the first path segment of `url`.
/// The segment is percent-decoded, then a leading `@` is stripped; everything
/// else is kept verbatim.
pub fn resolve(url: &str, platform: &Platform) -> Result<CollectionHandle, ResolveError> {
    let not_a_collection = || ResolveError::NotACollectionUrl {
        url: url.to_string(),
        domain: platform.domain().to_string(),
    };

    let parsed = Url::parse(url.trim()).map_err(|_| not_a_collection())?;
    let host = parsed.host_str().ok_or_else(not_a_collection)?;
    if !platform.owns_host(host) {
        return Err(not_a_collection());
    }

    let first = parsed
        .path_segments()
        .and_then(|mut segments| segments.find(|segment| !segment.is_empty()))
        .ok_or_else(not_a_collection)?;
    let decoded = urlencoding::decode(first).map_err(|_| not_a_collection())?;
    let name = decoded.strip_prefix('@').unwrap_or(&decoded[..]);
    if name.is_empty() {
        return Err(not_a_collection());
    }

    Ok(CollectionHandle::new(name))
}
