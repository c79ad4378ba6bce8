//! HTTP adapter for the two upstream lookups.
//!
//! Upstream failures never escape as errors: every transport error, timeout,
//! non-success status or undecodable body becomes the stage's error outcome.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;
use url::Url;
use warden_core::{ItemOutcome, ItemProcessor};

use super::config::UpstreamConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct BanCheckResponse {
    pub flagged: bool,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValuationResponse {
    pub value: f64,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpItemProcessor {
    client: Client,
    ban_check_url: Url,
    valuation_url: Option<Url>,
    api_key: Option<String>,
}

impl HttpItemProcessor {
    pub fn new(
        ban_check_url: Url,
        valuation_url: Option<Url>,
        request_timeout: Duration,
        api_key: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self {
            client,
            ban_check_url,
            valuation_url,
            api_key,
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let ban_check_url = config
            .ban_check_url
            .clone()
            .context("upstream.ban_check_url must be configured")?;
        Self::new(
            ban_check_url,
            config.valuation_url.clone(),
            config.request_timeout,
            config.api_key.clone(),
        )
    }

    async fn lookup<T: DeserializeOwned>(
        &self,
        endpoint: &Url,
        id: &str,
    ) -> Result<T, reqwest::Error> {
        let mut request =
            self.client.get(endpoint.clone()).query(&[("id", id)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request.send().await?.error_for_status()?.json::<T>().await
    }
}

#[async_trait]
impl ItemProcessor for HttpItemProcessor {
    async fn process_item(&self, id: &str) -> ItemOutcome {
        let ban = match self
            .lookup::<BanCheckResponse>(&self.ban_check_url, id)
            .await
        {
            Ok(ban) => ban,
            Err(err) => {
                debug!(id, error = %err, "ban check failed");
                return ItemOutcome::stage1_error(id, err.to_string());
            }
        };

        if ban.flagged {
            let reason = ban
                .reason
                .unwrap_or_else(|| "flagged by ban check".to_string());
            return ItemOutcome::flagged(id, ban.display_name, reason);
        }

        let Some(valuation_url) = &self.valuation_url else {
            return ItemOutcome::clean(id, ban.display_name);
        };

        match self.lookup::<ValuationResponse>(valuation_url, id).await {
            Ok(valuation) => ItemOutcome::valued(
                id,
                valuation.display_name.or(ban.display_name),
                valuation.value,
            ),
            Err(err) => {
                debug!(id, error = %err, "valuation failed");
                ItemOutcome::stage2_error(id, ban.display_name, err.to_string())
            }
        }
    }
}
