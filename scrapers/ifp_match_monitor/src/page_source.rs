use async_trait::async_trait;
use tracing::debug;

use crate::error::FetchError;

pub const MATCH_LIST_PATH: &str = "/commander/tour/public/MatchList.aspx";
pub const WELCOME_PATH: &str = "/commander/tour/public/welcome.aspx";

/// Where the tournament's public pages come from.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// The matches-in-progress page.
    async fn fetch_match_list(&self) -> Result<String, FetchError>;
    /// The welcome page carrying the tournament name.
    async fn fetch_welcome(&self) -> Result<String, FetchError>;
}

pub struct HttpPageSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPageSource {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching {}", url);

        let transport = |source| FetchError::Transport {
            url: url.clone(),
            source,
        };
        let response = self.client.get(&url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(transport)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_match_list(&self) -> Result<String, FetchError> {
        self.fetch(MATCH_LIST_PATH).await
    }

    async fn fetch_welcome(&self) -> Result<String, FetchError> {
        self.fetch(WELCOME_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_match_list() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", MATCH_LIST_PATH)
            .with_status(200)
            .with_body("<html><body>matches</body></html>")
            .create_async()
            .await;

        let source = HttpPageSource::new(reqwest::Client::new(), &format!("{}/", server.url()));
        let body = source.fetch_match_list().await.unwrap();
        assert!(body.contains("matches"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", WELCOME_PATH)
            .with_status(503)
            .create_async()
            .await;

        let source = HttpPageSource::new(reqwest::Client::new(), &server.url());
        let err = source.fetch_welcome().await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert_eq!(err.status_label(), "503");
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let source = HttpPageSource::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let err = source.fetch_match_list().await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
        assert_eq!(err.status_label(), "?");
    }
}
