use thiserror::Error;

/// Failure to retrieve one of the upstream tournament pages.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    /// Status code as shown in admin alerts, `?` when no response arrived.
    pub fn status_label(&self) -> String {
        match self {
            FetchError::Transport { source, .. } => source
                .status()
                .map(|s| s.as_u16().to_string())
                .unwrap_or_else(|| "?".to_string()),
            FetchError::Status { status, .. } => status.to_string(),
        }
    }
}

/// A single match row that could not be read. The rest of the page is unaffected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("row {row}: expected at least {expected} cells, found {found}")]
    MissingCells {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("row {row}: no {field} text")]
    EmptyField { row: usize, field: &'static str },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("name search request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("name search returned status {0}")]
    Status(u16),
    #[error("unable to parse name search response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Invalid request: {0}")]
    InvalidInput(String),
    #[error("{name} already monitored by {number}")]
    Duplicate { name: String, number: String },
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SubscriptionError {
    /// Whether the message may be shown verbatim to the person who asked.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            SubscriptionError::InvalidInput(_) | SubscriptionError::Duplicate { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("SMS request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("SMS provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("no sender numbers configured")]
    NoSenderNumbers,
    #[error("SMS credentials missing: {0}")]
    MissingCredentials(&'static str),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("could not determine tournament name from welcome page")]
    MissingTournamentName,
    #[error(transparent)]
    Store(#[from] StoreError),
}
