use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    dedup::NotificationRecords, error::StoreError, session::TournamentSession,
    subscribers::SubscriberRegistry,
};

pub const SUBSCRIBERS_FILE: &str = "subscribers.json";
pub const NOTIFICATIONS_FILE: &str = "notifications.json";
pub const TOURNAMENT_FILE: &str = "tournament.json";
pub const RECEIVED_MESSAGES_FILE: &str = "received_messages.jsonl";
pub const DIRECTORY_FILE: &str = "player_directory.json";
pub const ARCHIVE_DIR: &str = "archive";

/// Files that belong to one tournament and move out on archive.
const TOURNAMENT_FILES: [&str; 4] = [
    SUBSCRIBERS_FILE,
    NOTIFICATIONS_FILE,
    TOURNAMENT_FILE,
    RECEIVED_MESSAGES_FILE,
];

/// Every player that ever subscribed, with the last number used. Kept across archives.
pub type PlayerDirectory = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub time: DateTime<Utc>,
    pub from: Option<String>,
    pub body: Option<String>,
}

/// JSON files under one data directory, rewritten wholesale on every save.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_subscribers(&self) -> Result<SubscriberRegistry, StoreError> {
        self.read_json(SUBSCRIBERS_FILE)
    }

    pub fn save_subscribers(&self, subscribers: &SubscriberRegistry) -> Result<(), StoreError> {
        self.write_json(SUBSCRIBERS_FILE, subscribers)
    }

    pub fn load_notifications(&self) -> Result<NotificationRecords, StoreError> {
        self.read_json(NOTIFICATIONS_FILE)
    }

    pub fn save_notifications(&self, records: &NotificationRecords) -> Result<(), StoreError> {
        self.write_json(NOTIFICATIONS_FILE, records)
    }

    pub fn load_session(&self) -> Result<TournamentSession, StoreError> {
        self.read_json(TOURNAMENT_FILE)
    }

    pub fn save_session(&self, session: &TournamentSession) -> Result<(), StoreError> {
        self.write_json(TOURNAMENT_FILE, session)
    }

    pub fn load_directory(&self) -> Result<PlayerDirectory, StoreError> {
        self.read_json(DIRECTORY_FILE)
    }

    pub fn save_directory(&self, directory: &PlayerDirectory) -> Result<(), StoreError> {
        self.write_json(DIRECTORY_FILE, directory)
    }

    pub fn has_notifications(&self) -> bool {
        self.root.join(NOTIFICATIONS_FILE).exists()
    }

    pub fn append_received_message(&self, message: &ReceivedMessage) -> Result<(), StoreError> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(RECEIVED_MESSAGES_FILE))?;
        let line = serde_json::to_string(message)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    pub fn load_received_messages(&self) -> Result<Vec<ReceivedMessage>, StoreError> {
        let path = self.root.join(RECEIVED_MESSAGES_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }

    /// Moves the per-tournament files into `archive/<epoch millis>/` and
    /// returns that directory. The player directory stays in place.
    pub fn archive(&self, now: DateTime<Utc>) -> Result<PathBuf, StoreError> {
        let archive_dir = self
            .root
            .join(ARCHIVE_DIR)
            .join(now.timestamp_millis().to_string());
        fs::create_dir_all(&archive_dir)?;

        let mut moved: Vec<(PathBuf, PathBuf)> = Vec::new();
        for file in TOURNAMENT_FILES {
            let source = self.root.join(file);
            if !source.exists() {
                continue;
            }
            let target = archive_dir.join(file);
            if let Err(e) = fs::rename(&source, &target) {
                error!("Archiving {:?} failed, restoring moved files: {}", source, e);
                for (source, target) in moved.iter().rev() {
                    if let Err(e) = fs::rename(target, source) {
                        error!("Could not restore {:?}: {}", source, e);
                    }
                }
                return Err(e.into());
            }
            moved.push((source, target));
        }
        info!("Archived tournament data to {:?}", archive_dir);
        Ok(archive_dir)
    }

    /// A missing file reads as the empty value.
    fn read_json<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T, StoreError> {
        let path = self.root.join(file);
        if !path.exists() {
            warn!("No saved data at {:?}, starting empty", path);
            return Ok(T::default());
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        let path = self.root.join(file);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::sample_match;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 4, 20, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        assert!(store.load_subscribers().unwrap().is_empty());
        assert!(store.load_notifications().unwrap().is_empty());
        assert_eq!(store.load_session().unwrap(), TournamentSession::default());
        assert!(store.load_received_messages().unwrap().is_empty());
        assert!(!store.has_notifications());
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let mut subscribers = SubscriberRegistry::new();
        subscribers.add("5551234", "George Barta").unwrap();
        subscribers.add("5559876", "JENNY ONG Jr.").unwrap();
        subscribers.set_enabled("5559876", false);

        let mut session = TournamentSession::new();
        session.open("2017 Pennsylvania State", now());
        let matches = vec![sample_match("George Barta", "Dave Eck", "12")];
        session.process_matches(matches, &subscribers, now());

        store.save_subscribers(&subscribers).unwrap();
        store.save_notifications(&session.notifications).unwrap();
        store.save_session(&session).unwrap();

        assert_eq!(store.load_subscribers().unwrap(), subscribers);
        assert_eq!(store.load_notifications().unwrap(), session.notifications);
        let restored = store.load_session().unwrap();
        assert_eq!(restored.tracker, session.tracker);
        assert_eq!(restored.tournament_name, session.tournament_name);
    }

    #[test]
    fn test_received_messages_append() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let message = ReceivedMessage {
            time: now(),
            from: Some("+15551234".to_string()),
            body: Some("George Barta".to_string()),
        };
        store.append_received_message(&message).unwrap();
        store.append_received_message(&message).unwrap();
        assert_eq!(store.load_received_messages().unwrap(), vec![message.clone(), message]);
    }

    #[test]
    fn test_archive_moves_tournament_files() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let mut subscribers = SubscriberRegistry::new();
        subscribers.add("5551234", "George Barta").unwrap();
        store.save_subscribers(&subscribers).unwrap();
        store.save_notifications(&NotificationRecords::new()).unwrap();
        let mut directory = PlayerDirectory::new();
        directory.insert("George Barta".to_string(), "5551234".to_string());
        store.save_directory(&directory).unwrap();

        let archived = store.archive(now()).unwrap();

        assert!(archived.join(SUBSCRIBERS_FILE).exists());
        assert!(archived.join(NOTIFICATIONS_FILE).exists());
        assert!(!dir.path().join(SUBSCRIBERS_FILE).exists());
        assert!(store.load_subscribers().unwrap().is_empty());
        assert_eq!(store.load_directory().unwrap(), directory);
    }

    #[test]
    fn test_failed_archive_restores_files() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let mut subscribers = SubscriberRegistry::new();
        subscribers.add("5551234", "George Barta").unwrap();
        store.save_subscribers(&subscribers).unwrap();
        store.save_notifications(&NotificationRecords::new()).unwrap();

        // A non-empty directory where the notifications file should land
        // makes the second move fail.
        let blocked = dir
            .path()
            .join(ARCHIVE_DIR)
            .join(now().timestamp_millis().to_string())
            .join(NOTIFICATIONS_FILE);
        fs::create_dir_all(blocked.join("occupied")).unwrap();

        assert!(store.archive(now()).is_err());
        assert!(dir.path().join(SUBSCRIBERS_FILE).exists());
        assert!(dir.path().join(NOTIFICATIONS_FILE).exists());
        assert_eq!(store.load_subscribers().unwrap(), subscribers);
    }
}
