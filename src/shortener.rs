use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

#[async_trait]
pub trait UrlShortener: Send + Sync {
    async fn shorten(&self, long_url: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct HttpShortener {
    http: Client,
    endpoint: Url,
    token: String,
}

impl fmt::Debug for HttpShortener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpShortener")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpShortener {
    pub fn new(endpoint: &str, token: String) -> Result<Self> {
        let endpoint = Url::parse(endpoint).context("invalid shortener endpoint")?;
        let http = Client::builder()
            .user_agent("petition-store/0.1")
            .build()
            .context("failed to build shortener http client")?;
        Ok(Self {
            http,
            endpoint,
            token,
        })
    }

    pub fn build_request(&self, long_url: &str) -> Result<reqwest::Request> {
        self.http
            .post(self.endpoint.clone())
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(&build_shorten_body(long_url))
            .build()
            .context("failed to build shortener request")
    }
}

#[async_trait]
impl UrlShortener for HttpShortener {
    async fn shorten(&self, long_url: &str) -> Result<String> {
        let request = self.build_request(long_url)?;
        debug!(url=%request.url(), long_url, "requesting short url");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach shortener")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("received 429 from shortener: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("shortener error {}: {}", status, body));
        }

        let payload: ShortenResponse = res.json().await.context("invalid shortener response")?;
        if payload.link.trim().is_empty() {
            return Err(anyhow!("shortener returned an empty link"));
        }
        Ok(payload.link)
    }
}

pub fn build_shorten_body(long_url: &str) -> Value {
    json!({ "long_url": long_url })
}

#[derive(Deserialize)]
struct ShortenResponse {
    link: String,
}
