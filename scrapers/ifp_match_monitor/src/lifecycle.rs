use std::{
    collections::{BTreeMap, HashSet},
    sync::LazyLock,
};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{Match, MatchStatus, TrackedMatch};

static DOUBLES_TEAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^&]+) & (.*)$").expect("doubles team pattern"));

/// Individual players named in a team slot. A doubles slot reads "A & B".
pub fn players_in_slot(team: &str) -> Vec<&str> {
    match DOUBLES_TEAM.captures(team) {
        Some(caps) => [caps.get(1), caps.get(2)]
            .into_iter()
            .flatten()
            .map(|m| m.as_str())
            .collect(),
        None => vec![team],
    }
}

/// Matches that started or finished during one reconciliation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LifecycleChanges {
    pub started: Vec<String>,
    pub finished: Vec<TrackedMatch>,
}

/// Follows which matches are in progress from one poll to the next.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLifecycleTracker {
    active: BTreeMap<String, TrackedMatch>,
    #[serde(default)]
    finished: Vec<TrackedMatch>,
    #[serde(default)]
    appearance_counts: BTreeMap<String, u32>,
}

impl MatchLifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles the active set against the matches seen in this poll.
    pub fn track_progress(&mut self, current: &[Match], now: DateTime<Utc>) -> LifecycleChanges {
        let mut changes = LifecycleChanges::default();
        let current_keys: HashSet<String> = current.iter().map(Match::key).collect();

        let ended: Vec<String> = self
            .active
            .keys()
            .filter(|key| !current_keys.contains(*key))
            .cloned()
            .collect();
        for key in ended {
            if let Some(mut tracked) = self.active.remove(&key) {
                tracked.status = MatchStatus::Finished;
                tracked.end_time = Some(now);
                info!(
                    "MATCH TRACK {}, {}, {}",
                    tracked.key,
                    tracked.start_time.to_rfc3339(),
                    now.to_rfc3339()
                );
                changes.finished.push(tracked.clone());
                self.finished.push(tracked);
            }
        }

        for m in current {
            let key = m.key();
            if self.active.contains_key(&key) {
                continue;
            }
            for player in players_in_slot(&m.team1)
                .into_iter()
                .chain(players_in_slot(&m.team2))
            {
                *self.appearance_counts.entry(player.to_string()).or_insert(0) += 1;
            }
            self.active.insert(
                key.clone(),
                TrackedMatch {
                    key: key.clone(),
                    details: m.clone(),
                    start_time: now,
                    end_time: None,
                    status: MatchStatus::Active,
                },
            );
            changes.started.push(key);
        }

        changes
    }

    /// Matches currently in progress, oldest first.
    pub fn active_matches(&self) -> Vec<TrackedMatch> {
        let mut active: Vec<TrackedMatch> = self.active.values().cloned().collect();
        active.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.key.cmp(&b.key)));
        active
    }

    pub fn finished_matches(&self) -> &[TrackedMatch] {
        &self.finished
    }

    pub fn appearance_count(&self, player: &str) -> u32 {
        self.appearance_counts.get(player).copied().unwrap_or(0)
    }

    pub fn appearance_counts(&self) -> &BTreeMap<String, u32> {
        &self.appearance_counts
    }
}
