//! HTTP pull adapter over the upstream REST API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use pulse_core::{PullSource, Topic, UpstreamError};
use pulse_settings::UpstreamSettings;
use serde_json::Value;
use tracing::debug;

use crate::errors::ClientError;

/// [`PullSource`] backed by `reqwest`: `GET {base_url}{path}` per topic.
#[derive(Debug)]
pub struct HttpPullSource {
    client: reqwest::Client,
    base_url: String,
    paths: HashMap<Topic, String>,
}

impl HttpPullSource {
    /// Build from upstream settings. Unknown topic names in the path map are
    /// a configuration error.
    pub fn new(settings: &UpstreamSettings) -> Result<Self, ClientError> {
        let paths = settings
            .paths
            .iter()
            .map(|(name, path)| Ok((name.parse::<Topic>()?, path.clone())))
            .collect::<Result<HashMap<_, _>, pulse_core::PulseError>>()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(concat!("pulse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            paths,
        })
    }

    /// Full URL for `topic`, if mapped.
    pub fn url_for(&self, topic: Topic) -> Option<String> {
        self.paths
            .get(&topic)
            .map(|path| format!("{}{}", self.base_url, path))
    }
}

#[async_trait]
impl PullSource for HttpPullSource {
    async fn get(&self, topic: Topic) -> Result<Value, UpstreamError> {
        let url = self.url_for(topic).ok_or(UpstreamError::Unsupported(topic))?;
        debug!(topic = %topic, url = %url, "pulling");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(topic)
            } else {
                UpstreamError::unavailable(topic, format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::unavailable(topic, format!("HTTP {status}")));
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(topic)
            } else {
                UpstreamError::unavailable(topic, format!("invalid JSON body: {e}"))
            }
        })
    }
}
