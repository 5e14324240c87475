//! HTTP client for the manifest host.

use super::Manifest;
use crate::config::ManifestConfig;
use crate::utils::errors::{Result, UpdaterError};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::Url;
use tracing::{info, warn};

const MANIFEST_PATH: &str = "/api/manifest";

/// Fetches the manifest for an environment. Never retries on its own.
#[derive(Debug, Clone)]
pub struct ManifestClient {
    http: reqwest::Client,
    config: ManifestConfig,
}

impl ManifestClient {
    pub fn new(config: ManifestConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(config.timeout())
            .build()?;

        Ok(Self { http, config })
    }

    /// `{scheme}://{host}/api/manifest?environment=..&internal_key=..`
    pub fn manifest_url(&self, environment: &str, access_key: &str) -> Result<Url> {
        let base = format!("{}{}", self.config.base_url(), MANIFEST_PATH);
        let mut url = Url::parse(&base)
            .map_err(|e| UpdaterError::Config(format!("invalid manifest host {}: {}", base, e)))?;

        url.query_pairs_mut()
            .append_pair("environment", environment)
            .append_pair("internal_key", access_key);

        Ok(url)
    }

    /// Fetch and parse the manifest. Transport failures, redirects and non-2xx
    /// statuses are [`UpdaterError::Network`]; a malformed body is
    /// [`UpdaterError::Parse`].
    pub async fn fetch(&self, environment: &str, access_key: &str) -> Result<Manifest> {
        let url = self.manifest_url(environment, access_key)?;
        info!(
            "Fetching manifest for environment '{}' from {}{}",
            environment,
            self.config.base_url(),
            MANIFEST_PATH
        );

        let response = self
            .http
            .get(url)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| UpdaterError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_redirection() {
            warn!("Manifest host answered with a redirect ({})", status);
            return Err(UpdaterError::Network(format!(
                "unexpected redirect from manifest host: {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(UpdaterError::Network(format!(
                "manifest request failed with status {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| UpdaterError::Network(e.to_string()))?;

        let manifest = Manifest::from_json(&body)?;
        info!(
            "Fetched manifest v{}: {} files, {} bytes",
            manifest.version,
            manifest.len(),
            manifest.total_bytes()
        );

        Ok(manifest)
    }
}
