use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Largest page body parsed for metadata; head tags live near the top.
const MAX_PAGE_BYTES: usize = 512 * 1024;

/// Fetches the HTML of an arbitrary page for link previews.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// Fetches through an optional relay prefix (e.g. `https://relay/raw?url=`)
/// to which the percent-encoded target URL is appended.
#[derive(Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    relay: Option<String>,
}

impl HttpPageFetcher {
    pub fn new(relay: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mural/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, relay })
    }

    fn request_url(&self, target: &Url) -> String {
        match &self.relay {
            Some(relay) => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
                format!("{}{}", relay, encoded)
            }
            None => target.to_string(),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        let response = self.client.get(self.request_url(url)).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("page fetch returned {}", response.status()));
        }

        let body = response.bytes().await?;
        let body = &body[..body.len().min(MAX_PAGE_BYTES)];
        Ok(String::from_utf8_lossy(body).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_receives_encoded_target() {
        let fetcher = HttpPageFetcher::new(
            Some("https://relay.test/raw?url=".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();
        let target = Url::parse("https://example.com/a?b=c&d=e").unwrap();

        assert_eq!(
            fetcher.request_url(&target),
            "https://relay.test/raw?url=https%3A%2F%2Fexample.com%2Fa%3Fb%3Dc%26d%3De"
        );
    }

    #[test]
    fn direct_fetch_without_relay() {
        let fetcher = HttpPageFetcher::new(None, Duration::from_secs(1)).unwrap();
        let target = Url::parse("https://example.com/").unwrap();
        assert_eq!(fetcher.request_url(&target), "https://example.com/");
    }
}
