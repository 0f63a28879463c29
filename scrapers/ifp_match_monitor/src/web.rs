use axum::{
    extract::{Form, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    error::MonitorError,
    inbound::handle_inbound,
    monitor::{Monitor, StartOutcome},
};

/// Entries shown by the log endpoint.
const LOG_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

/// Plain-text failure with a status code.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct AddPlayerParams {
    name: Option<String>,
    number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationForm {
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct InboundForm {
    #[serde(rename = "From")]
    from: Option<String>,
    #[serde(rename = "Body")]
    body: Option<String>,
}

#[axum::debug_handler]
pub async fn index_handler(State(state): State<AppState>) -> Html<String> {
    let stats = state.monitor.stats().await;
    let log = state.monitor.notification_log(LOG_LIMIT).await;
    let matches: String = stats
        .current_matches
        .iter()
        .map(|m| format!("<li>{}</li>", html_escape::encode_text(&m.call_message())))
        .collect();
    let log: String = log
        .iter()
        .map(|line| format!("<li>{}</li>", html_escape::encode_text(line)))
        .collect();

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>IFP Match Monitor</title>
    <script src="https://unpkg.com/@tailwindcss/browser@4"></script>
    <script>
        function updateStats() {{
            fetch('/stats')
                .then(response => response.json())
                .then(stats => {{
                    document.getElementById('status').textContent = stats.running ? 'Running' : 'Stopped';
                    document.getElementById('sent').textContent = stats.notifications_sent;
                    document.getElementById('subscribers').textContent = stats.subscriber_count;
                    document.getElementById('players').textContent = stats.monitored_players.join(', ');
                }});
        }}
        setInterval(updateStats, 5000);
    </script>
</head>
<body class="bg-gray-100 min-h-screen p-8">
    <div class="max-w-6xl mx-auto">
        <h1 class="text-3xl font-bold mb-2 text-gray-800">{}</h1>
        <div class="bg-white rounded-lg shadow-lg p-6 mb-8">
            <div class="grid grid-cols-1 md:grid-cols-3 gap-6">
                <div class="bg-blue-50 p-4 rounded-lg">
                    <h2 class="text-sm font-semibold text-blue-600 mb-1">Status</h2>
                    <p class="text-2xl font-bold text-blue-700" id="status">{}</p>
                </div>
                <div class="bg-green-50 p-4 rounded-lg">
                    <h2 class="text-sm font-semibold text-green-600 mb-1">Notifications Sent</h2>
                    <p class="text-2xl font-bold text-green-700" id="sent">{}</p>
                </div>
                <div class="bg-purple-50 p-4 rounded-lg">
                    <h2 class="text-sm font-semibold text-purple-600 mb-1">Subscribers</h2>
                    <p class="text-2xl font-bold text-purple-700" id="subscribers">{}</p>
                </div>
            </div>
            <p class="mt-4 text-gray-600">Monitoring: <span id="players">{}</span></p>
        </div>
        <div class="bg-white rounded-lg shadow-lg p-6 mb-8">
            <h2 class="text-xl font-semibold mb-4">Matches In Progress</h2>
            <ul class="text-sm text-gray-700">{}</ul>
        </div>
        <div class="bg-white rounded-lg shadow-lg p-6">
            <h2 class="text-xl font-semibold mb-4">Notification Log</h2>
            <ul class="text-sm text-gray-600 font-mono">{}</ul>
        </div>
    </div>
</body>
</html>"#,
        html_escape::encode_text(stats.tournament_name.as_deref().unwrap_or("No tournament")),
        if stats.running { "Running" } else { "Stopped" },
        stats.notifications_sent,
        stats.subscriber_count,
        html_escape::encode_text(&stats.monitored_players.join(", ")),
        matches,
        log
    ))
}

#[axum::debug_handler]
pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.stats().await)
}

#[axum::debug_handler]
pub async fn log_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.notification_log(LOG_LIMIT).await)
}

#[axum::debug_handler]
pub async fn players_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.subscribers().await)
}

#[axum::debug_handler]
pub async fn add_player_handler(
    State(state): State<AppState>,
    Query(params): Query<AddPlayerParams>,
) -> Result<String, ApiError> {
    let name = params.name.unwrap_or_default();
    let number = params.number.unwrap_or_default();
    match state.monitor.add_subscriber(&name, &number).await {
        Ok(_) => Ok(format!("Added {} for {}", name.trim(), number.trim())),
        Err(e) if e.is_user_visible() => Err(ApiError(StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => {
            error!("Failed to add {} for {}: {}", name, number, e);
            Err(ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[axum::debug_handler]
pub async fn remove_handler(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    state
        .monitor
        .remove_number(&number)
        .await
        .map(Json)
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

#[axum::debug_handler]
pub async fn set_monitor_status_handler(
    State(state): State<AppState>,
    Path((number, enabled)): Path<(String, bool)>,
) -> Result<String, ApiError> {
    match state.monitor.set_enabled(&number, enabled).await {
        Ok(true) => Ok(format!("{} enabled={}", number, enabled)),
        Ok(false) => Err(ApiError(
            StatusCode::NOT_FOUND,
            format!("No subscriber with number {}", number),
        )),
        Err(e) => Err(ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

#[axum::debug_handler]
pub async fn start_handler(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    match state.monitor.start().await {
        Ok(StartOutcome::Started) => Ok("Started"),
        Ok(StartOutcome::AlreadyRunning) => Ok("Already running"),
        Err(MonitorError::Store(e)) => {
            error!("Unable to save tournament state: {}", e);
            Err(ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
        Err(e) => {
            error!("Unable to start monitor: {}", e);
            Err(ApiError(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

#[axum::debug_handler]
pub async fn stop_handler(State(state): State<AppState>) -> &'static str {
    if state.monitor.stop().await {
        "Stopped"
    } else {
        "Not running"
    }
}

#[axum::debug_handler]
pub async fn archive_handler(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .monitor
        .archive()
        .await
        .map(|path| format!("Archived to {}", path.display()))
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

#[axum::debug_handler]
pub async fn player_db_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.monitor.player_directory().await)
}

#[axum::debug_handler]
pub async fn set_registration_response_handler(
    State(state): State<AppState>,
    Form(form): Form<RegistrationForm>,
) -> String {
    state.monitor.set_registration_response(&form.message).await;
    state.monitor.registration_response().await
}

#[axum::debug_handler]
pub async fn message_in_handler(
    State(state): State<AppState>,
    Form(form): Form<InboundForm>,
) -> impl IntoResponse {
    let reply = handle_inbound(&state.monitor, form.from.as_deref(), form.body.as_deref()).await;
    ([(header::CONTENT_TYPE, "text/xml")], reply.to_twiml())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/stats", get(stats_handler))
        .route("/log", get(log_handler))
        .route("/players", get(players_handler))
        .route("/addPlayer", get(add_player_handler))
        .route("/remove/{number}", get(remove_handler))
        .route("/setMonitorStatus/{number}/{status}", get(set_monitor_status_handler))
        .route("/start", get(start_handler))
        .route("/stop", get(stop_handler))
        .route("/archive", get(archive_handler))
        .route("/playerDb", get(player_db_handler))
        .route("/setRegistrationResponse", post(set_registration_response_handler))
        .route("/messageIn", post(message_in_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the control surface until ctrl-c, then stops polling.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let monitor = state.monitor.clone();
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Web interface available at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await?;

    monitor.stop().await;
    Ok(())
}
