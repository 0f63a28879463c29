use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    dedup::NotificationRecords,
    lifecycle::MatchLifecycleTracker,
    player_finder,
    subscribers::SubscriberRegistry,
    types::{DispatchInstruction, Match},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub started: Option<DateTime<Utc>>,
    pub stopped: Option<DateTime<Utc>>,
    pub notifications_sent: u64,
    pub notification_log: Vec<String>,
    pub notifications_per_player: BTreeMap<String, u64>,
    pub current_matches: Vec<Match>,
}

impl SessionStats {
    pub fn record_dispatch(&mut self, instruction: &DispatchInstruction, at: DateTime<Utc>) {
        self.notifications_sent += 1;
        self.notification_log.push(format!(
            "{} {} ({}) - {}",
            at.with_timezone(&Local).format("%H:%M:%S"),
            instruction.player,
            instruction.subscriber,
            instruction.message
        ));
        *self
            .notifications_per_player
            .entry(instruction.player.clone())
            .or_insert(0) += 1;
    }

    /// Newest entries first.
    pub fn recent_log(&self, limit: usize) -> Vec<String> {
        self.notification_log.iter().rev().take(limit).cloned().collect()
    }
}

/// All mutable state belonging to one tournament.
///
/// The notification records and stats are kept out of the serialized form;
/// records have their own file and stats only live as long as the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentSession {
    pub tournament_name: Option<String>,
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tracker: MatchLifecycleTracker,
    #[serde(skip)]
    pub notifications: NotificationRecords,
    #[serde(skip)]
    pub stats: SessionStats,
}

impl TournamentSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the tournament being monitored. Returns false when the same
    /// tournament was already open.
    pub fn open(&mut self, name: &str, now: DateTime<Utc>) -> bool {
        if self.tournament_name.as_deref() == Some(name) {
            return false;
        }
        info!("Monitoring tournament '{}'", name);
        self.tournament_name = Some(name.to_string());
        self.opened_at = Some(now);
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// One poll's worth of in-process work: lifecycle first, then the
    /// called-player lookup and notification reconciliation.
    pub fn process_matches(
        &mut self,
        matches: Vec<Match>,
        subscribers: &SubscriberRegistry,
        now: DateTime<Utc>,
    ) -> Vec<DispatchInstruction> {
        self.tracker.track_progress(&matches, now);

        let called = player_finder::find_active(&matches, &subscribers.monitored_names());
        let dispatch = self
            .notifications
            .reconcile(&called, |player| subscribers.recipients_for(player));

        for instruction in &dispatch {
            self.stats.record_dispatch(instruction, now);
        }
        self.stats.current_matches = matches;
        dispatch
    }
}
