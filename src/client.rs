//! Upstream transport for the mobile Weibo container API.
//!
//! The walker only sees [`FeedSource`]; [`WeiboClient`] is the HTTP
//! implementation used by the binary.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::config::HttpConfig;
use crate::error::{CrawlError, Result};
use crate::model::{PageResponse, ProfileResponse};

/// Container prefix for account metadata.
const PROFILE_CONTAINER_PREFIX: &str = "100505";

/// Container prefix for an account's post feed.
const FEED_CONTAINER_PREFIX: &str = "107603";

/// Source of profile metadata and feed pages.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the profile metadata for `account_id`.
    async fn fetch_profile(&self, account_id: &str) -> Result<ProfileResponse>;

    /// Fetch feed page `page` (1-based) for `account_id`.
    async fn fetch_page(&self, account_id: &str, page: u64) -> Result<PageResponse>;
}

/// Container id of an account's profile.
#[must_use]
pub fn profile_container(account_id: &str) -> String {
    format!("{PROFILE_CONTAINER_PREFIX}{account_id}")
}

/// Container id of an account's post feed.
#[must_use]
pub fn feed_container(account_id: &str) -> String {
    format!("{FEED_CONTAINER_PREFIX}{account_id}")
}

/// HTTP client for `m.weibo.cn/api/container/getIndex`.
pub struct WeiboClient {
    client: reqwest::Client,
    base_url: String,
}

impl WeiboClient {
    /// Build a client from the HTTP configuration.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, params: &[(&str, String)]) -> Result<T> {
        trace!(url = %self.base_url, ?params, "GET");
        let resp = self
            .client
            .get(&self.base_url)
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CrawlError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl FeedSource for WeiboClient {
    async fn fetch_profile(&self, account_id: &str) -> Result<ProfileResponse> {
        debug!(account_id, "Fetching profile");
        self.get_json(&[("containerid", profile_container(account_id))])
            .await
    }

    async fn fetch_page(&self, account_id: &str, page: u64) -> Result<PageResponse> {
        debug!(account_id, page, "Fetching feed page");
        self.get_json(&[
            ("containerid", feed_container(account_id)),
            ("page", page.to_string()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_ids() {
        assert_eq!(profile_container("5281889184"), "1005055281889184");
        assert_eq!(feed_container("5281889184"), "1076035281889184");
    }

    #[test]
    fn client_builds_from_default_config() {
        let client = WeiboClient::new(&HttpConfig::default()).unwrap();
        assert!(client.base_url.starts_with("https://m.weibo.cn/"));
    }
}
