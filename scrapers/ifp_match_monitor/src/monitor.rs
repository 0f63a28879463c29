use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{oneshot, Mutex},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    error::{FetchError, MonitorError, SearchError, StoreError, SubscriptionError},
    name_matcher::{NameMatcher, SearchProvider},
    page_parser,
    page_source::PageSource,
    session::TournamentSession,
    sms::SmsSender,
    store::{PlayerDirectory, ReceivedMessage, Store},
    subscribers::{AddOutcome, SubscriberRegistry},
    types::{Match, TrackedMatch},
};

pub const DEFAULT_REGISTRATION_RESPONSE: &str = "$player registered, you will receive messages when called for a match. Send REMOVE to be removed from this list.";

/// Network collaborators of the monitor.
#[derive(Clone)]
pub struct MonitorServices {
    pub pages: Arc<dyn PageSource>,
    pub search: Arc<dyn SearchProvider>,
    pub sms: Arc<dyn SmsSender>,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub admin_number: Option<String>,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nobody is subscribed.
    Skipped,
    /// Another poll holds the guard.
    AlreadyRunning,
    FetchFailed,
    Processed { matches: usize, dispatched: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub running: bool,
    pub tournament_name: Option<String>,
    pub started: Option<DateTime<Utc>>,
    pub stopped: Option<DateTime<Utc>>,
    pub notifications_sent: u64,
    pub notifications_per_player: BTreeMap<String, u64>,
    pub monitored_players: Vec<String>,
    pub subscriber_count: usize,
    pub current_matches: Vec<Match>,
    pub active_matches: Vec<TrackedMatch>,
    pub finished_match_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub number: String,
    pub in_tournament: bool,
    pub being_monitored: bool,
}

struct MonitorState {
    session: TournamentSession,
    subscribers: SubscriberRegistry,
    directory: PlayerDirectory,
    registration_response: String,
    problem_notified: bool,
}

struct PollHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the tournament session and drives the polling timeline.
pub struct Monitor {
    state: Mutex<MonitorState>,
    store: Store,
    matcher: NameMatcher,
    pages: Arc<dyn PageSource>,
    sms: Arc<dyn SmsSender>,
    settings: MonitorSettings,
    poller: Mutex<Option<PollHandle>>,
    poll_guard: Mutex<()>,
}

impl Monitor {
    /// Restores subscribers, the session and notification records from `store`.
    pub fn new(
        services: MonitorServices,
        store: Store,
        settings: MonitorSettings,
    ) -> Result<Self, StoreError> {
        let mut session = store.load_session()?;
        session.notifications = store.load_notifications()?;
        let subscribers = store.load_subscribers()?;
        let directory = store.load_directory()?;
        info!(
            "Loaded {} subscribers and {} notification records",
            subscribers.len(),
            session.notifications.len()
        );

        Ok(Self {
            state: Mutex::new(MonitorState {
                session,
                subscribers,
                directory,
                registration_response: DEFAULT_REGISTRATION_RESPONSE.to_string(),
                problem_notified: false,
            }),
            store,
            matcher: NameMatcher::new(services.search),
            pages: services.pages,
            sms: services.sms,
            settings,
            poller: Mutex::new(None),
            poll_guard: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn is_running(&self) -> bool {
        self.poller
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Resolves the tournament name and schedules polling. The first poll runs
    /// immediately.
    pub async fn start(self: &Arc<Self>) -> Result<StartOutcome, MonitorError> {
        let mut poller = self.poller.lock().await;
        if poller.as_ref().is_some_and(|h| !h.task.is_finished()) {
            info!("Monitor already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let notifications = if self.store.has_notifications() {
            Some(self.store.load_notifications()?)
        } else {
            None
        };

        let welcome = self.pages.fetch_welcome().await?;
        let tournament_name = page_parser::parse_tournament_name(&welcome);
        if tournament_name.is_empty() {
            return Err(MonitorError::MissingTournamentName);
        }

        {
            let mut state = self.state.lock().await;
            if let Some(notifications) = notifications {
                state.session.notifications = notifications;
            }
            let now = Utc::now();
            state.session.open(&tournament_name, now);
            state.session.stats.started = Some(now);
            state.session.stats.stopped = None;
            self.store.save_session(&state.session)?;
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let monitor = Arc::clone(self);
        let period = self.settings.poll_interval;
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now(), period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let poll = Arc::clone(&monitor);
                        if let Err(e) = tokio::spawn(async move { poll.poll_once().await }).await {
                            error!("Poll aborted, continuing with the next tick: {}", e);
                        }
                    }
                }
            }
            debug!("Poll loop exited");
        });

        *poller = Some(PollHandle { shutdown, task });
        info!(
            "Monitoring '{}' every {:?}",
            tournament_name, self.settings.poll_interval
        );
        Ok(StartOutcome::Started)
    }

    /// Cancels future polls. A poll already in flight finishes first.
    /// Returns false when the monitor was not running.
    pub async fn stop(&self) -> bool {
        let Some(handle) = self.poller.lock().await.take() else {
            return false;
        };
        let _ = handle.shutdown.send(());
        if let Err(e) = handle.task.await {
            error!("Poll task ended abnormally: {}", e);
        }

        let mut state = self.state.lock().await;
        state.session.stats.stopped = Some(Utc::now());
        info!("Monitor stopped");
        true
    }

    /// One poll cycle. Never overlaps another cycle.
    pub async fn poll_once(&self) -> PollOutcome {
        let Ok(_guard) = self.poll_guard.try_lock() else {
            debug!("Poll already in progress, skipping tick");
            return PollOutcome::AlreadyRunning;
        };

        if self.state.lock().await.subscribers.is_empty() {
            debug!("No players being monitored, skipping poll");
            return PollOutcome::Skipped;
        }

        let html = match self.pages.fetch_match_list().await {
            Ok(html) => html,
            Err(e) => {
                self.report_problem(&e).await;
                return PollOutcome::FetchFailed;
            }
        };
        self.report_restored().await;

        let matches = page_parser::parse_matches(&html);
        let match_count = matches.len();
        let dispatch = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let dispatch = state
                .session
                .process_matches(matches, &state.subscribers, Utc::now());
            if let Err(e) = self.persist_session(&state.session) {
                error!("Failed to persist tournament state: {}", e);
            }
            dispatch
        };

        for instruction in &dispatch {
            self.send_sms(&instruction.subscriber, &instruction.message).await;
        }
        PollOutcome::Processed {
            matches: match_count,
            dispatched: dispatch.len(),
        }
    }

    /// Moves the tournament's files aside and starts an empty session. The
    /// player directory is kept.
    pub async fn archive(&self) -> Result<PathBuf, MonitorError> {
        self.stop().await;
        let mut state = self.state.lock().await;
        let archived = self.store.archive(Utc::now())?;
        state.session.reset();
        state.subscribers = SubscriberRegistry::new();
        state.registration_response = DEFAULT_REGISTRATION_RESPONSE.to_string();
        state.problem_notified = false;
        Ok(archived)
    }

    pub async fn search(&self, query: &str) -> Result<Vec<String>, SearchError> {
        self.matcher.search(query).await
    }

    pub async fn add_subscriber(
        &self,
        name: &str,
        number: &str,
    ) -> Result<AddOutcome, SubscriptionError> {
        let name = name.trim();
        let number = number.trim();
        let (outcome, registration) = {
            let mut state = self.state.lock().await;
            let outcome = state.subscribers.add(number, name)?;
            self.store.save_subscribers(&state.subscribers)?;
            state.directory.insert(name.to_string(), number.to_string());
            self.store.save_directory(&state.directory)?;
            let registration = state.registration_response.replace("$player", name);
            (outcome, registration)
        };

        info!("Added {} to monitor for {}", name, number);
        self.notify_admin(&format!(
            "Added {} to monitor, sending notifications to {}",
            name, number
        ))
        .await;
        self.send_sms(number, &registration).await;
        Ok(outcome)
    }

    /// Stops every notification to `number`, returning the names it followed.
    pub async fn remove_number(&self, number: &str) -> Result<Vec<String>, StoreError> {
        let names = {
            let mut state = self.state.lock().await;
            let names = state.subscribers.remove_number(number);
            if names.is_empty() {
                return Ok(names);
            }
            self.store.save_subscribers(&state.subscribers)?;
            names
        };

        let list = names.join(", ");
        self.send_sms(number, &format!("No longer monitoring: {}", list))
            .await;
        self.notify_admin(&format!("Removed {} from monitor ({})", number, list))
            .await;
        Ok(names)
    }

    pub async fn set_enabled(&self, number: &str, enabled: bool) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if !state.subscribers.set_enabled(number, enabled) {
            return Ok(false);
        }
        info!("Set {} monitoring enabled={}", number, enabled);
        self.store.save_subscribers(&state.subscribers)?;
        Ok(true)
    }

    pub async fn set_extras(&self, number: &str, extras: bool) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if !state.subscribers.set_extras(number, extras) {
            return Ok(false);
        }
        self.store.save_subscribers(&state.subscribers)?;
        Ok(true)
    }

    pub async fn registration_response(&self) -> String {
        self.state.lock().await.registration_response.clone()
    }

    pub async fn set_registration_response(&self, message: &str) {
        info!("Registration response set to '{}'", message);
        self.state.lock().await.registration_response = message.to_string();
    }

    pub async fn subscribers(&self) -> SubscriberRegistry {
        self.state.lock().await.subscribers.clone()
    }

    pub async fn stats(&self) -> StatsSnapshot {
        let running = self.is_running().await;
        let state = self.state.lock().await;
        let session = &state.session;
        StatsSnapshot {
            running,
            tournament_name: session.tournament_name.clone(),
            started: session.stats.started,
            stopped: session.stats.stopped,
            notifications_sent: session.stats.notifications_sent,
            notifications_per_player: session.stats.notifications_per_player.clone(),
            monitored_players: state.subscribers.monitored_names(),
            subscriber_count: state.subscribers.len(),
            current_matches: session.stats.current_matches.clone(),
            active_matches: session.tracker.active_matches(),
            finished_match_count: session.tracker.finished_matches().len(),
        }
    }

    /// Newest first.
    pub async fn notification_log(&self, limit: usize) -> Vec<String> {
        self.state.lock().await.session.stats.recent_log(limit)
    }

    pub async fn player_directory(&self) -> Vec<DirectoryEntry> {
        let state = self.state.lock().await;
        state
            .directory
            .iter()
            .map(|(name, number)| DirectoryEntry {
                name: name.clone(),
                number: number.clone(),
                in_tournament: state.session.tracker.appearance_count(name) > 0,
                being_monitored: state.subscribers.is_monitored(name),
            })
            .collect()
    }

    pub fn record_inbound(&self, from: Option<&str>, body: Option<&str>) {
        let message = ReceivedMessage {
            time: Utc::now(),
            from: from.map(str::to_string),
            body: body.map(str::to_string),
        };
        if let Err(e) = self.store.append_received_message(&message) {
            error!("Failed to record inbound message: {}", e);
        }
    }

    pub async fn notify_admin(&self, message: &str) {
        match &self.settings.admin_number {
            Some(admin) => self.send_sms(admin, message).await,
            None => warn!("No admin number configured, dropping: {}", message),
        }
    }

    async fn send_sms(&self, to: &str, body: &str) {
        if let Err(e) = self.sms.send(to, body).await {
            error!("Failed to send message to {}: {}", to, e);
        }
    }

    fn persist_session(&self, session: &TournamentSession) -> Result<(), StoreError> {
        self.store.save_notifications(&session.notifications)?;
        self.store.save_session(session)
    }

    async fn report_problem(&self, err: &FetchError) {
        error!("Error fetching match list: {}", err);
        let first_failure = {
            let mut state = self.state.lock().await;
            !std::mem::replace(&mut state.problem_notified, true)
        };
        if first_failure {
            self.notify_admin(&format!(
                "Request failed.. status: {} error: {}",
                err.status_label(),
                err
            ))
            .await;
        }
    }

    async fn report_restored(&self) {
        let was_failing = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut state.problem_notified, false)
        };
        if was_failing {
            info!("Match list reachable again");
            self.notify_admin("Functionality restored").await;
        }
    }
}
