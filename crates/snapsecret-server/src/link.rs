use axum::http::{header::HOST, HeaderMap};

/// How share links are built from a freshly minted token.
#[derive(Debug, Clone, Default)]
pub struct LinkConfig {
    /// Fixed public base URL. When unset the request's `Host` header is used.
    pub public_url: Option<String>,
    /// Use `http://` for Host-derived links (local development).
    pub no_ssl: bool,
    /// Extra path segment(s) when served below the site root.
    pub url_prefix: Option<String>,
}

impl LinkConfig {
    /// Base URL ending in `/`, or `None` if neither `public_url` nor a usable
    /// `Host` header is available.
    pub fn base_url(&self, headers: &HeaderMap) -> Option<String> {
        let mut base = match &self.public_url {
            Some(url) => format!("{}/", url.trim_end_matches('/')),
            None => {
                let host = headers.get(HOST)?.to_str().ok()?.trim();
                if host.is_empty() {
                    return None;
                }
                let scheme = if self.no_ssl { "http" } else { "https" };
                format!("{scheme}://{host}/")
            }
        };

        let prefix = self.url_prefix.as_deref().map(|p| p.trim_matches('/'));
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            base.push_str(prefix);
            base.push('/');
        }
        Some(base)
    }

    /// The link a recipient opens. Tokens are URL-safe as minted, so no
    /// escaping is applied.
    pub fn share_link(&self, headers: &HeaderMap, token: &str) -> Option<String> {
        Some(format!("{}secrets/{token}", self.base_url(headers)?))
    }
}
