//! Once-per-occurrence notification bookkeeping.
//!
//! Each (subscriber, match) pair owns a record. Records are refreshed while the
//! match stays on the in-progress page and released on the first poll it is
//! missing from, so a later reappearance notifies again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{AlertKind, DispatchInstruction, Match};

const ACTIVE: u8 = 1;
const PENDING_EXPIRY: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Unseen,
    Active,
    PendingExpiry,
}

/// A subscriber of a called player, as seen by the deduplicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub id: String,
    pub enabled: bool,
}

pub fn dedup_key(subscriber: &str, m: &Match) -> String {
    format!(
        "{}_{}_{}_{}_{}_{}",
        subscriber, m.event, m.team1, m.team2, m.for_position, m.table
    )
}

pub fn recall_key(subscriber: &str, m: &Match) -> String {
    format!("{}_recall", dedup_key(subscriber, m))
}

/// Persisted as a flat JSON object of key to `1`/`0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationRecords(BTreeMap<String, u8>);

impl NotificationRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &str) -> RecordState {
        match self.0.get(key) {
            None => RecordState::Unseen,
            Some(&ACTIVE) => RecordState::Active,
            Some(_) => RecordState::PendingExpiry,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Runs one poll's worth of the record state machine and returns the
    /// notifications that must go out.
    ///
    /// Disabled recipients advance their records like everyone else but never
    /// receive a dispatch.
    pub fn reconcile<F>(
        &mut self,
        called: &BTreeMap<String, Match>,
        subscribers_of: F,
    ) -> Vec<DispatchInstruction>
    where
        F: Fn(&str) -> Vec<Recipient>,
    {
        for state in self.0.values_mut() {
            *state = PENDING_EXPIRY;
        }

        let mut dispatch = Vec::new();
        for (player, current) in called {
            for recipient in subscribers_of(player) {
                self.touch(
                    dedup_key(&recipient.id, current),
                    &recipient,
                    player,
                    AlertKind::CallUp,
                    current.call_message(),
                    &mut dispatch,
                );
                if current.is_recalled() {
                    self.touch(
                        recall_key(&recipient.id, current),
                        &recipient,
                        player,
                        AlertKind::Recall,
                        current.recall_message(),
                        &mut dispatch,
                    );
                }
            }
        }

        self.0.retain(|_, state| *state == ACTIVE);
        dispatch
    }

    fn touch(
        &mut self,
        key: String,
        recipient: &Recipient,
        player: &str,
        kind: AlertKind,
        message: String,
        dispatch: &mut Vec<DispatchInstruction>,
    ) {
        if self.0.insert(key, ACTIVE).is_some() {
            return;
        }
        if !recipient.enabled {
            warn!("Player {} is disabled for {}, not sending notification", player, recipient.id);
            return;
        }
        info!("Notifying {} ({}) {}", player, recipient.id, message);
        dispatch.push(DispatchInstruction {
            subscriber: recipient.id.clone(),
            player: player.to_string(),
            kind,
            message,
        });
    }
}
