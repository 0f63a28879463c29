use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::error;

use crate::{error::SearchError, name_matcher::SearchProvider};

pub const SEARCH_PATH: &str = "/commander/internal/ComboStreamer.aspx";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ComboResponse {
    items: Vec<ComboItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ComboItem {
    text: String,
}

/// User search backed by the tournament site's combo-box endpoint.
pub struct ComboSearchClient {
    client: reqwest::Client,
    base_url: String,
}

impl ComboSearchClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for ComboSearchClient {
    async fn search_names(&self, text: &str) -> Result<Vec<String>, SearchError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let response = self
            .client
            .get(format!("{}{}", self.base_url, SEARCH_PATH))
            .query(&[
                ("e", "users"),
                ("rcbID", "R"),
                ("rcbServerID", "R"),
                ("text", text),
                ("comboText", ""),
                ("comboValue", ""),
                ("skin", "VSNet"),
                ("external", "true"),
                ("timeStamp", timestamp.as_str()),
            ])
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .send()
            .await
            .map_err(|e| {
                error!("Error searching player names: {}", e);
                SearchError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let parsed: ComboResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Unable to parse response when searching for player: {}", e);
            SearchError::Parse(e)
        })?;
        Ok(parsed.items.into_iter().map(|item| item.text).collect())
    }
}
