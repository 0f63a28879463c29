use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{dedup::Recipient, error::SubscriptionError, types::Subscriber};

/// Result of a successful subscription.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// Names dropped because the subscriber is limited to a single name.
    pub replaced: Vec<String>,
}

/// Subscribers keyed by contact number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberRegistry {
    subscribers: BTreeMap<String, Subscriber>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts monitoring `name` for `number`.
    ///
    /// Without extras enabled a subscriber follows one name at a time, so a
    /// new name replaces the previous one.
    pub fn add(&mut self, number: &str, name: &str) -> Result<AddOutcome, SubscriptionError> {
        let name = name.trim();
        let number = number.trim();
        if name.is_empty() {
            return Err(SubscriptionError::InvalidInput("missing player name".to_string()));
        }
        if number.is_empty() {
            return Err(SubscriptionError::InvalidInput("missing contact number".to_string()));
        }

        let Some(subscriber) = self.subscribers.get_mut(number) else {
            self.subscribers.insert(number.to_string(), Subscriber::new(name));
            return Ok(AddOutcome::default());
        };

        if subscriber.names.iter().any(|n| n == name) {
            return Err(SubscriptionError::Duplicate {
                name: name.to_string(),
                number: number.to_string(),
            });
        }

        let replaced = if subscriber.extras {
            Vec::new()
        } else {
            std::mem::take(&mut subscriber.names)
        };
        if !replaced.is_empty() {
            info!("{} now monitors {} instead of {}", number, name, replaced.join(", "));
        }
        subscriber.names.push(name.to_string());
        Ok(AddOutcome { replaced })
    }

    /// Drops a subscriber entirely, returning the names it monitored.
    pub fn remove_number(&mut self, number: &str) -> Vec<String> {
        self.subscribers
            .remove(number.trim())
            .map(|s| s.names)
            .unwrap_or_default()
    }

    pub fn set_enabled(&mut self, number: &str, enabled: bool) -> bool {
        match self.subscribers.get_mut(number) {
            Some(subscriber) => {
                subscriber.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn set_extras(&mut self, number: &str, extras: bool) -> bool {
        match self.subscribers.get_mut(number) {
            Some(subscriber) => {
                subscriber.extras = extras;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, number: &str) -> Option<&Subscriber> {
        self.subscribers.get(number)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Subscriber)> {
        self.subscribers.iter()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Every distinct monitored name, sorted.
    pub fn monitored_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .subscribers
            .values()
            .flat_map(|s| s.names.iter().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn is_monitored(&self, name: &str) -> bool {
        self.subscribers
            .values()
            .any(|s| s.names.iter().any(|n| n == name))
    }

    pub fn recipients_for(&self, name: &str) -> Vec<Recipient> {
        self.subscribers
            .iter()
            .filter(|(_, s)| s.names.iter().any(|n| n == name))
            .map(|(number, s)| Recipient {
                id: number.clone(),
                enabled: s.enabled,
            })
            .collect()
    }
}
