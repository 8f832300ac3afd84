use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use reqwest::Url;
use tracing::debug;

use crate::cache::{CacheKey, Fetch};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct ShadertoyConfig {
    pub api_key: Option<String>,
    pub api_base: Url,
    pub media_base: Url,
}

impl ShadertoyConfig {
    /// `host` is a bare host name such as `www.shadertoy.com`. Blank keys are
    /// treated as absent.
    pub fn new(host: &str, api_key: Option<String>) -> Result<Self> {
        let host = host.trim();
        if host.is_empty() {
            bail!("Shadertoy host must not be empty");
        }
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        Ok(Self {
            api_key,
            api_base: Url::parse(&format!("https://{host}/api/v1/"))
                .with_context(|| format!("invalid Shadertoy host '{host}'"))?,
            media_base: Url::parse(&format!("https://{host}/"))
                .with_context(|| format!("invalid Shadertoy host '{host}'"))?,
        })
    }

    fn definition_url(&self, id: &str) -> Result<Url> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("no Shadertoy API key configured"))?;
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("invalid Shadertoy API base url"))?
            .pop_if_empty()
            .push("shaders")
            .push(id);
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(url)
    }

    fn media_url(&self, path: &str) -> Result<Url> {
        self.media_base
            .join(path.trim_start_matches('/'))
            .context("joining media url")
    }

    pub fn url_for(&self, key: &CacheKey) -> Result<Url> {
        match key {
            CacheKey::Definition(id) => self.definition_url(id.as_str()),
            CacheKey::Image(path) => self.media_url(path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShadertoyClient {
    http: Client,
    config: ShadertoyConfig,
}

impl ShadertoyClient {
    pub fn new(config: ShadertoyConfig) -> Result<Self> {
        let http = Client::builder()
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("shaderreel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ShadertoyConfig {
        &self.config
    }
}

impl Fetch for ShadertoyClient {
    fn fetch(&self, key: &CacheKey) -> Result<Vec<u8>> {
        let url = self.config.url_for(key)?;
        debug!(%key, host = url.host_str().unwrap_or_default(), "fetching from shadertoy");
        let response = self
            .http
            .get(url.clone())
            .send()
            .with_context(|| format!("requesting {key}"))?
            .error_for_status()
            .with_context(|| format!("Shadertoy returned an error status for {key}"))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("reading response body for {key}"))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContentId;

    #[test]
    fn builds_definition_url_with_key() {
        let config = ShadertoyConfig::new("www.shadertoy.com", Some(" secret ".into())).unwrap();
        let key = CacheKey::definition(&ContentId::parse("XsXXDn").unwrap());
        assert_eq!(
            config.url_for(&key).unwrap().as_str(),
            "https://www.shadertoy.com/api/v1/shaders/XsXXDn?key=secret"
        );
    }

    #[test]
    fn builds_media_url_from_normalized_key() {
        let config = ShadertoyConfig::new("example.test", None).unwrap();
        let key = CacheKey::image("https://www.shadertoy.com/media/a/noise.png").unwrap();
        assert_eq!(
            config.url_for(&key).unwrap().as_str(),
            "https://example.test/media/a/noise.png"
        );
    }

    #[test]
    fn definitions_require_api_key() {
        let config = ShadertoyConfig::new("www.shadertoy.com", Some("   ".into())).unwrap();
        assert!(config.api_key.is_none());
        let key = CacheKey::definition(&ContentId::parse("abc").unwrap());
        assert!(config.url_for(&key).is_err());
    }

    #[test]
    fn rejects_empty_host() {
        assert!(ShadertoyConfig::new("  ", None).is_err());
    }
}
