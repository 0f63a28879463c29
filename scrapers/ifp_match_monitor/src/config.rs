use serde::{Deserialize, Serialize};
use std::{env, num::NonZeroU32, path::PathBuf, time::Duration};

use nonzero_ext::nonzero;

use crate::sms::TWILIO_API_BASE;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://ifp.everguide.com".to_string(),
            user_agent: "Mozilla/5.0 (compatible; IfpMonitor/1.0)".to_string(),
            request_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmsConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_numbers: Vec<String>,
    /// Log messages instead of sending them.
    pub disabled: bool,
    pub per_second: NonZeroU32,
    pub api_base: String,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            from_numbers: Vec::new(),
            disabled: false,
            per_second: nonzero!(1u32),
            api_base: TWILIO_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorConfig {
    pub upstream: UpstreamConfig,
    pub sms: SmsConfig,
    pub admin_number: Option<String>,
    pub poll_interval_secs: u64,
    pub data_dir: PathBuf,
    pub port: u16,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            sms: SmsConfig::default(),
            admin_number: None,
            poll_interval_secs: 30,
            data_dir: PathBuf::from("db"),
            port: 8081,
        }
    }
}

fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse::<T>().ok())
}

fn flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::trim),
        Some("1") | Some("true") | Some("TRUE") | Some("yes")
    )
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset or unparsable values keep
    /// their defaults.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = var("SERVER_URL") {
            config.upstream.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(user_agent) = var("SCRAPER_USER_AGENT") {
            config.upstream.user_agent = user_agent;
        }
        if let Some(timeout) = parsed(var("REQUEST_TIMEOUT_SECS")) {
            config.upstream.request_timeout_secs = timeout;
        }
        if let Some(interval) = parsed::<u64>(var("POLL_INTERVAL_SECS")) {
            config.poll_interval_secs = interval.max(1);
        }
        if let Some(port) = parsed(var("HOST_PORT")) {
            config.port = port;
        }
        if let Some(dir) = var("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config.admin_number = var("ADMIN_NUMBER").filter(|n| !n.trim().is_empty());

        config.sms.account_sid = var("TWILIO_ACCOUNT_SID");
        config.sms.auth_token = var("TWILIO_ACCOUNT_AUTH");
        if let Some(numbers) = var("TWILIO_PHONE_NUMBERS") {
            config.sms.from_numbers = numbers
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
        }
        config.sms.disabled = flag(var("SMS_DISABLED"));
        if let Some(rate) = parsed(var("SMS_PER_SECOND")) {
            config.sms.per_second = rate;
        }

        config
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(&self.upstream.user_agent)
            .timeout(Duration::from_secs(self.upstream.request_timeout_secs))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::from_vars(lookup(&[]));
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.upstream.base_url, "http://ifp.everguide.com");
        assert!(config.admin_number.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = MonitorConfig::from_vars(lookup(&[
            ("SERVER_URL", "http://localhost:9000/"),
            ("POLL_INTERVAL_SECS", "5"),
            ("HOST_PORT", "9090"),
            ("ADMIN_NUMBER", "5550000"),
            ("TWILIO_PHONE_NUMBERS", "+15550001, +15550002,"),
            ("SMS_DISABLED", "true"),
            ("SMS_PER_SECOND", "3"),
            ("DATA_DIR", "/tmp/ifp"),
        ]));

        assert_eq!(config.upstream.base_url, "http://localhost:9000");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.port, 9090);
        assert_eq!(config.admin_number.as_deref(), Some("5550000"));
        assert_eq!(config.sms.from_numbers, vec!["+15550001", "+15550002"]);
        assert!(config.sms.disabled);
        assert_eq!(config.sms.per_second.get(), 3);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ifp"));
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = MonitorConfig::from_vars(lookup(&[
            ("POLL_INTERVAL_SECS", "often"),
            ("SMS_PER_SECOND", "0"),
            ("HOST_PORT", "99999"),
        ]));
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.sms.per_second.get(), 1);
        assert_eq!(config.port, 8081);
    }
}
