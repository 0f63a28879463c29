use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the matches-in-progress table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub event: String,
    pub table: String,
    pub team1: String,
    pub team2: String,
    pub for_position: String,
    #[serde(default)]
    pub team1_recall: bool,
    #[serde(default)]
    pub team2_recall: bool,
}

impl Match {
    /// Identity of the match across polls.
    pub fn key(&self) -> String {
        [
            self.event.as_str(),
            self.table.as_str(),
            self.team1.as_str(),
            self.team2.as_str(),
            self.for_position.as_str(),
        ]
        .join(", ")
    }

    pub fn is_recalled(&self) -> bool {
        self.team1_recall || self.team2_recall
    }

    pub fn call_message(&self) -> String {
        format!(
            "Table {} {} {} vs {} for {}",
            self.table, self.event, self.team1, self.team2, self.for_position
        )
    }

    pub fn recall_message(&self) -> String {
        format!("RECALL: {}", self.call_message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Active,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedMatch {
    pub key: String,
    pub details: Match,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: MatchStatus,
}

/// Everything a single phone number has asked to follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub enabled: bool,
    pub names: Vec<String>,
    /// Allows more than one monitored name at a time.
    #[serde(default)]
    pub extras: bool,
}

impl Subscriber {
    pub fn new(name: &str) -> Self {
        Self {
            enabled: true,
            names: vec![name.to_string()],
            extras: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CallUp,
    Recall,
}

/// A single SMS the monitor has decided to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchInstruction {
    pub subscriber: String,
    pub player: String,
    pub kind: AlertKind,
    pub message: String,
}

#[cfg(test)]
pub(crate) fn sample_match(team1: &str, team2: &str, table: &str) -> Match {
    Match {
        event: "Open Doubles".to_string(),
        table: table.to_string(),
        team1: team1.to_string(),
        team2: team2.to_string(),
        for_position: "9th".to_string(),
        team1_recall: false,
        team2_recall: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_key_and_messages() {
        let m = sample_match("George Barta", "JENNY ONG Jr.", "12");
        assert_eq!(m.key(), "Open Doubles, 12, George Barta, JENNY ONG Jr., 9th");
        assert_eq!(
            m.call_message(),
            "Table 12 Open Doubles George Barta vs JENNY ONG Jr. for 9th"
        );
        assert_eq!(
            m.recall_message(),
            "RECALL: Table 12 Open Doubles George Barta vs JENNY ONG Jr. for 9th"
        );
        assert!(!m.is_recalled());
    }

    #[test]
    fn test_subscriber_defaults_extras_when_missing() {
        let subscriber: Subscriber =
            serde_json::from_str(r#"{"enabled":true,"names":["George Barta"]}"#).unwrap();
        assert!(!subscriber.extras);
        assert_eq!(subscriber.names, vec!["George Barta"]);
    }
}
