use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::IntoResponse,
};
use ifp_match_monitor::{
    error::SmsError,
    inbound::{handle_inbound, InboundReply},
    monitor::{Monitor, MonitorServices, MonitorSettings, PollOutcome, StartOutcome},
    page_source::{HttpPageSource, MATCH_LIST_PATH, WELCOME_PATH},
    search_client::{ComboSearchClient, SEARCH_PATH},
    sms::SmsSender,
    store::Store,
    web::{self, AppState},
};
use mockito::{Matcher, ServerGuard};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const ADMIN: &str = "5550000";

#[derive(Default)]
struct RecordingSms {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSms {
    fn sent_to(&self, to: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(number, _)| number == to)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl SmsSender for RecordingSms {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

const WELCOME_HTML: &str = include_str!("fixtures/welcome.html");
const MATCH_LIST_HTML: &str = include_str!("fixtures/match_list.html");

async fn upstream() -> ServerGuard {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", WELCOME_PATH)
        .with_status(200)
        .with_body(WELCOME_HTML)
        .create_async()
        .await;
    server
        .mock("GET", MATCH_LIST_PATH)
        .with_status(200)
        .with_body(MATCH_LIST_HTML)
        .create_async()
        .await;
    server
        .mock("GET", SEARCH_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"Items":[{"Text":"JENNY ONG Jr. (PA)"},{"Text":"Dave Eck (NJ)"}]}"#)
        .create_async()
        .await;
    server
}

fn monitor(server: &ServerGuard, dir: &Path, sms: Arc<RecordingSms>) -> Arc<Monitor> {
    let client = reqwest::Client::new();
    let services = MonitorServices {
        pages: Arc::new(HttpPageSource::new(client.clone(), &server.url())),
        search: Arc::new(ComboSearchClient::new(client, &server.url())),
        sms,
    };
    let settings = MonitorSettings {
        admin_number: Some(ADMIN.to_string()),
        poll_interval: Duration::from_secs(3600),
    };
    Arc::new(Monitor::new(services, Store::open(dir).unwrap(), settings).unwrap())
}

#[test_log::test(tokio::test)]
async fn test_subscribe_by_text_then_notify_once() {
    let server = upstream().await;
    let dir = TempDir::new().unwrap();
    let sms = Arc::new(RecordingSms::default());
    let monitor = monitor(&server, dir.path(), sms.clone());

    let reply = handle_inbound(&monitor, Some("+15551234"), Some("Jenny Ong")).await;
    assert_eq!(reply, InboundReply::Silent);
    assert_eq!(
        sms.sent_to(ADMIN),
        vec!["Added JENNY ONG Jr. to monitor, sending notifications to 5551234"]
    );
    sms.clear();

    let first = monitor.poll_once().await;
    let second = monitor.poll_once().await;
    assert_eq!(first, PollOutcome::Processed { matches: 2, dispatched: 1 });
    assert_eq!(second, PollOutcome::Processed { matches: 2, dispatched: 0 });
    assert_eq!(
        sms.sent_to("5551234"),
        vec!["Table 12 Open Doubles George Barta & Ann Lee vs Dave Eck & JENNY ONG Jr. for 9th"]
    );

    let stats = monitor.stats().await;
    assert_eq!(stats.active_matches.len(), 2);
    assert_eq!(stats.notifications_sent, 1);
}

#[test_log::test(tokio::test)]
async fn test_recall_sends_second_alert() {
    let server = upstream().await;
    let dir = TempDir::new().unwrap();
    let sms = Arc::new(RecordingSms::default());
    let monitor = monitor(&server, dir.path(), sms.clone());

    monitor
        .add_subscriber("Michael Everton Jr.", "5559876")
        .await
        .unwrap();
    sms.clear();

    monitor.poll_once().await;
    assert_eq!(
        sms.sent_to("5559876"),
        vec![
            "Table 4 Open Singles Michael Everton Jr. vs Bob Jones for 5th",
            "RECALL: Table 4 Open Singles Michael Everton Jr. vs Bob Jones for 5th",
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_restart_does_not_resend() {
    let server = upstream().await;
    let dir = TempDir::new().unwrap();
    let sms = Arc::new(RecordingSms::default());

    let first = monitor(&server, dir.path(), sms.clone());
    first.add_subscriber("Bob Jones", "5554321").await.unwrap();
    first.poll_once().await;
    assert_eq!(sms.sent_to("5554321").len(), 3);
    drop(first);

    sms.clear();
    let restarted = monitor(&server, dir.path(), sms.clone());
    assert_eq!(
        restarted.poll_once().await,
        PollOutcome::Processed { matches: 2, dispatched: 0 }
    );
    assert!(sms.sent_to("5554321").is_empty());
}

#[test_log::test(tokio::test)]
async fn test_start_reads_tournament_name() {
    let server = upstream().await;
    let dir = TempDir::new().unwrap();
    let monitor = monitor(&server, dir.path(), Arc::new(RecordingSms::default()));

    assert_eq!(monitor.start().await.unwrap(), StartOutcome::Started);
    assert_eq!(
        monitor.stats().await.tournament_name.as_deref(),
        Some("2017 Pennsylvania State Championships")
    );
    assert!(monitor.stop().await);
}

#[test_log::test(tokio::test)]
async fn test_handler_error_converts_to_response() {
    let server = upstream().await;
    let dir = TempDir::new().unwrap();
    let monitor = monitor(&server, dir.path(), Arc::new(RecordingSms::default()));

    let result = web::set_monitor_status_handler(
        State(AppState { monitor }),
        UrlPath(("5550001".to_string(), true)),
    )
    .await;
    let Err(err) = result else {
        panic!("unknown subscriber should be rejected");
    };
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
}
