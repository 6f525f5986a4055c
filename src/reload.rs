//! Guide server reload signal
//!
//! After a new guide file is written the downstream guide server is asked to
//! re-read it. The signal is fire and forget from the pipeline's point of view.

use crate::config::GuideServerConfig;
use crate::errors::{AppResult, FetchError};
use crate::utils::redact_url;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait GuideServerReload: Send + Sync {
    async fn reload(&self) -> AppResult<()>;
}

/// Used when no guide server is configured
pub struct NoopReload;

#[async_trait]
impl GuideServerReload for NoopReload {
    async fn reload(&self) -> AppResult<()> {
        debug!("No guide server configured, skipping reload");
        Ok(())
    }
}

/// POSTs `rerun=1` to the guide server's XMLTV grabber endpoint
pub struct HttpReloadSignal {
    client: Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpReloadSignal {
    pub fn new(url: String, username: Option<String>, password: Option<String>) -> AppResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            url,
            username,
            password,
        })
    }
}

#[async_trait]
impl GuideServerReload for HttpReloadSignal {
    async fn reload(&self) -> AppResult<()> {
        let display_url = redact_url(&self.url);
        let mut request = self.client.post(&self.url).form(&[("rerun", "1")]);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&display_url, e))?;
        if !response.status().is_success() {
            return Err(FetchError::Http {
                url: display_url,
                status: response.status().as_u16(),
            }
            .into());
        }

        info!("Guide server at {} asked to reload the guide", display_url);
        Ok(())
    }
}

/// Pick the reload signal for a configuration
pub fn from_config(config: &GuideServerConfig) -> AppResult<Box<dyn GuideServerReload>> {
    match &config.reload_url {
        Some(url) if !url.trim().is_empty() => Ok(Box::new(HttpReloadSignal::new(
            url.clone(),
            config.username.clone(),
            config.password.clone(),
        )?)),
        _ => Ok(Box::new(NoopReload)),
    }
}
