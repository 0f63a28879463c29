//! Text-message commands sent to the monitor's numbers.
//!
//! A message is either `REMOVE` or a player name to search for. A single
//! search hit subscribes the sender; anything else is answered with guidance.

use tracing::{error, info};

use crate::{error::SubscriptionError, monitor::Monitor, name_matcher::MIN_QUERY_LEN};

/// More hits than this are not listed back to the sender.
pub const MAX_CANDIDATES: usize = 5;

const SERVICE_ERROR_REPLY: &str =
    "Sorry, the player search is unavailable right now. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundReply {
    Silent,
    Message(String),
}

impl InboundReply {
    fn message(text: impl Into<String>) -> Self {
        InboundReply::Message(text.into())
    }

    /// TwiML body answering the webhook.
    pub fn to_twiml(&self) -> String {
        match self {
            InboundReply::Silent => {
                r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#.to_string()
            }
            InboundReply::Message(text) => format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><Response><Message>{}</Message></Response>"#,
                html_escape::encode_text(text)
            ),
        }
    }
}

/// Strips the North American country code the SMS provider prefixes.
pub fn normalize_number(from: &str) -> &str {
    let from = from.trim();
    from.strip_prefix("+1").unwrap_or(from)
}

pub async fn handle_inbound(
    monitor: &Monitor,
    from: Option<&str>,
    body: Option<&str>,
) -> InboundReply {
    monitor.record_inbound(from, body);

    let (Some(from), Some(body)) = (from, body) else {
        return InboundReply::message("Invalid Request");
    };
    let number = normalize_number(from);
    let text = body.trim();
    info!("Message from {}: {}", number, text);

    if text.chars().count() < MIN_QUERY_LEN {
        return InboundReply::message("Invalid request. Send 'REMOVE' or 'Player Name'");
    }

    if text.to_uppercase().starts_with("REMOVE") {
        return remove(monitor, number).await;
    }

    let names = match candidates(monitor, text).await {
        Ok(names) => names,
        Err(e) => {
            error!("Player search for '{}' failed: {}", text, e);
            notify_failure(monitor, number, text, &e).await;
            return InboundReply::message(SERVICE_ERROR_REPLY);
        }
    };

    match names.len() {
        0 => {
            monitor
                .notify_admin(&format!("From {} Not Found : {}", number, text))
                .await;
            InboundReply::message(format!(
                "No player found matching '{}'. Please check the name as registered for the tournament.",
                text
            ))
        }
        1 => subscribe(monitor, &names[0], number).await,
        n if n > MAX_CANDIDATES => InboundReply::message(format!(
            "{} players match '{}'. Please send a more specific name.",
            n, text
        )),
        _ => InboundReply::message(format!(
            "Multiple players found, reply with one of: {}",
            names.join(", ")
        )),
    }
}

async fn candidates(monitor: &Monitor, text: &str) -> Result<Vec<String>, SubscriptionError> {
    Ok(monitor.search(text).await?)
}

async fn remove(monitor: &Monitor, number: &str) -> InboundReply {
    match monitor.remove_number(number).await {
        Ok(names) if names.is_empty() => InboundReply::message(format!(
            "No players being monitored with number {}",
            number
        )),
        Ok(_) => InboundReply::Silent,
        Err(e) => {
            error!("Failed to remove {}: {}", number, e);
            monitor
                .notify_admin(&format!(
                    "Error trying to remove notifications for {}: {}",
                    number, e
                ))
                .await;
            InboundReply::message(SERVICE_ERROR_REPLY)
        }
    }
}

async fn subscribe(monitor: &Monitor, name: &str, number: &str) -> InboundReply {
    match monitor.add_subscriber(name, number).await {
        Ok(_) => InboundReply::Silent,
        Err(e) if e.is_user_visible() => InboundReply::message(format!("Error: {}", e)),
        Err(e) => {
            error!("Failed to subscribe {} to {}: {}", number, name, e);
            notify_failure(monitor, number, name, &e).await;
            InboundReply::message(SERVICE_ERROR_REPLY)
        }
    }
}

async fn notify_failure(monitor: &Monitor, number: &str, name: &str, err: &SubscriptionError) {
    monitor
        .notify_admin(&format!("Failed to add {} for {}: {}", name, number, err))
        .await;
}
