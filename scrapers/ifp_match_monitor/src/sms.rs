use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use tracing::{error, info};

use crate::{config::SmsConfig, error::SmsError};

pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Outbound text message transport.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError>;
}

fn pick_sender(numbers: &[String]) -> Result<&str, SmsError> {
    numbers
        .choose(&mut rand::thread_rng())
        .map(String::as_str)
        .ok_or(SmsError::NoSenderNumbers)
}

/// Sends through the Twilio messages REST endpoint.
pub struct TwilioSender {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_numbers: Vec<String>,
}

impl TwilioSender {
    pub fn new(client: reqwest::Client, config: &SmsConfig) -> Result<Self, SmsError> {
        let account_sid = config
            .account_sid
            .clone()
            .ok_or(SmsError::MissingCredentials("TWILIO_ACCOUNT_SID"))?;
        let auth_token = config
            .auth_token
            .clone()
            .ok_or(SmsError::MissingCredentials("TWILIO_ACCOUNT_AUTH"))?;
        if config.from_numbers.is_empty() {
            return Err(SmsError::NoSenderNumbers);
        }
        info!("Sending from the following phone numbers: {:?}", config.from_numbers);

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            from_numbers: config.from_numbers.clone(),
        })
    }
}

#[async_trait]
impl SmsSender for TwilioSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let from = pick_sender(&self.from_numbers)?.to_string();
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );

        let response = self
            .client
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from.as_str()), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Error sending SMS message to {}: {} {}", to, status, body);
            return Err(SmsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Logs messages instead of sending them.
pub struct LogSender {
    from_numbers: Vec<String>,
}

impl LogSender {
    pub fn new(from_numbers: Vec<String>) -> Self {
        let from_numbers = if from_numbers.is_empty() {
            vec!["111".to_string(), "222".to_string(), "333".to_string()]
        } else {
            from_numbers
        };
        Self { from_numbers }
    }
}

#[async_trait]
impl SmsSender for LogSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let from = pick_sender(&self.from_numbers)?;
        info!("SENDING from {} to : {} : {}", from, to, body);
        Ok(())
    }
}

/// Spaces sends out so the provider's per-second limit is respected.
pub struct RateLimitedSender<S> {
    inner: S,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl<S: SmsSender> RateLimitedSender<S> {
    pub fn new(inner: S, per_second: NonZeroU32) -> Self {
        Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }
}

#[async_trait]
impl<S: SmsSender> SmsSender for RateLimitedSender<S> {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        self.limiter.until_ready().await;
        self.inner.send(to, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use nonzero_ext::nonzero;

    fn config(api_base: &str) -> SmsConfig {
        SmsConfig {
            account_sid: Some("AC123".to_string()),
            auth_token: Some("secret".to_string()),
            from_numbers: vec!["+15550001".to_string()],
            disabled: false,
            per_second: nonzero!(1u32),
            api_base: api_base.to_string(),
        }
    }

    #[tokio::test]
    async fn test_twilio_send_posts_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .match_header("authorization", Matcher::Regex("^Basic ".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("To".into(), "5551234".into()),
                Matcher::UrlEncoded("From".into(), "+15550001".into()),
                Matcher::UrlEncoded("Body".into(), "Table 12 Open Doubles".into()),
            ]))
            .with_status(201)
            .with_body(r#"{"sid":"SM1"}"#)
            .create_async()
            .await;

        let sender = TwilioSender::new(reqwest::Client::new(), &config(&server.url())).unwrap();
        sender.send("5551234", "Table 12 Open Doubles").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_twilio_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .with_status(400)
            .with_body("invalid number")
            .create_async()
            .await;

        let sender = TwilioSender::new(reqwest::Client::new(), &config(&server.url())).unwrap();
        let err = sender.send("bogus", "hello").await.unwrap_err();
        assert!(matches!(err, SmsError::Rejected { status: 400, .. }));
    }

    #[test]
    fn test_twilio_requires_configuration() {
        let mut missing_numbers = config(TWILIO_API_BASE);
        missing_numbers.from_numbers.clear();
        assert!(matches!(
            TwilioSender::new(reqwest::Client::new(), &missing_numbers),
            Err(SmsError::NoSenderNumbers)
        ));

        let mut missing_sid = config(TWILIO_API_BASE);
        missing_sid.account_sid = None;
        assert!(matches!(
            TwilioSender::new(reqwest::Client::new(), &missing_sid),
            Err(SmsError::MissingCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_log_sender() {
        let sender = RateLimitedSender::new(LogSender::new(Vec::new()), nonzero!(100u32));
        sender.send("5551234", "hello").await.unwrap();
        sender.send("5551234", "again").await.unwrap();
    }
}
