use crate::application::bootstrap::bootstrap_workspace;
use crate::application::refresh::{RefreshOrchestrator, RefreshOutcome, RefreshRunner, TransportFactory};
use crate::application::scheduler::RefreshScheduler;
use crate::application::single_flight::RefreshCoordinator;
use crate::application::status::StatusService;
use crate::domain::models::{Credentials, DEFAULT_REFRESH_INTERVAL_HOURS};
use crate::domain::presentation::{DisplayZone, WidgetRow};
use crate::infrastructure::config::{load_settings, save_settings};
use crate::infrastructure::cookie_jar::session_cookie_jar;
use crate::infrastructure::credential_store::{
    CredentialStore, KeyringPasswordVault, PasswordVault, SettingsCredentialStore,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::moodle_api::MoodleEndpoints;
use crate::infrastructure::moodle_transport::ReqwestMoodleTransport;
use crate::infrastructure::notifier::ConfiguredNotifier;
use crate::infrastructure::widget_store::{FileWidgetDisplay, load_widget_snapshot};
use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

fn reqwest_transport_factory() -> TransportFactory<ReqwestMoodleTransport> {
    Arc::new(|| ReqwestMoodleTransport::new(session_cookie_jar()).map(Arc::new))
}

/// Rebuilds the refresh pipeline from the current settings on every run, so
/// edits made by `configure` apply without restarting `watch`.
pub struct WorkspaceRefreshRunner<V>
where
    V: PasswordVault,
{
    config_dir: PathBuf,
    state_dir: PathBuf,
    credential_store: Arc<SettingsCredentialStore<V>>,
    endpoints: MoodleEndpoints,
}

#[async_trait]
impl<V> RefreshRunner for WorkspaceRefreshRunner<V>
where
    V: PasswordVault + 'static,
{
    async fn run_refresh(&self) -> Result<RefreshOutcome, InfraError> {
        let settings = load_settings(&self.config_dir)?;
        let zone = DisplayZone::from_name(settings.timezone.as_deref());
        let orchestrator = RefreshOrchestrator::new(
            reqwest_transport_factory(),
            Arc::clone(&self.credential_store),
            Arc::new(ConfiguredNotifier::from_settings(&settings, &self.state_dir)),
            Arc::new(FileWidgetDisplay::new(
                &self.state_dir,
                settings.widget_enabled,
                zone,
            )),
        )
        .with_endpoints(self.endpoints.clone());
        orchestrator.run_refresh().await
    }
}

pub struct AppState<V = KeyringPasswordVault>
where
    V: PasswordVault + 'static,
{
    config_dir: PathBuf,
    state_dir: PathBuf,
    logs_dir: PathBuf,
    credential_store: Arc<SettingsCredentialStore<V>>,
    coordinator: Arc<RefreshCoordinator<WorkspaceRefreshRunner<V>>>,
    endpoints: MoodleEndpoints,
    log_guard: Mutex<()>,
}

impl AppState<KeyringPasswordVault> {
    pub fn open(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::new(workspace_root, KeyringPasswordVault::default())
    }
}

impl<V> AppState<V>
where
    V: PasswordVault + 'static,
{
    pub fn new(workspace_root: PathBuf, vault: V) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let credential_store = Arc::new(SettingsCredentialStore::new(&bootstrap.config_dir, vault));
        let endpoints = MoodleEndpoints::default();
        let runner = WorkspaceRefreshRunner {
            config_dir: bootstrap.config_dir.clone(),
            state_dir: bootstrap.state_dir.clone(),
            credential_store: Arc::clone(&credential_store),
            endpoints: endpoints.clone(),
        };

        Ok(Self {
            config_dir: bootstrap.config_dir,
            state_dir: bootstrap.state_dir,
            logs_dir: bootstrap.logs_dir,
            credential_store,
            coordinator: Arc::new(RefreshCoordinator::new(Arc::new(runner))),
            endpoints,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigureRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_interval_hours: Option<u32>,
    pub notification_lead_hours: Option<u32>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureResponse {
    pub username: String,
    pub refresh_interval_hours: u32,
    pub notification_lead_hours: u32,
    pub refresh: String,
}

fn describe_outcome(outcome: &RefreshOutcome) -> String {
    match outcome {
        RefreshOutcome::NoActiveWidgets => "skipped: widget disabled".to_string(),
        RefreshOutcome::Refreshed { fetched, notified } => {
            format!("refreshed: {fetched} assignments, {notified} notifications")
        }
        RefreshOutcome::Degraded { reason } => format!("degraded: {reason}"),
    }
}

/// Saves credentials and schedule, then runs one refresh right away. A failed
/// refresh does not undo the save.
pub async fn configure_impl<V>(
    state: &AppState<V>,
    request: ConfigureRequest,
) -> Result<ConfigureResponse, InfraError>
where
    V: PasswordVault + 'static,
{
    let current = state.credential_store.load()?;
    let username = request
        .username
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or(current.username)
        .ok_or_else(|| InfraError::InvalidConfig("username is required".to_string()))?;

    let timezone = match request.timezone.as_deref().map(str::trim) {
        Some("") => Some(None),
        Some(name) => {
            name.parse::<Tz>()
                .map_err(|_| InfraError::InvalidConfig(format!("unknown time zone: {name}")))?;
            Some(Some(name.to_string()))
        }
        None => None,
    };

    let credentials = Credentials {
        username: Some(username),
        password: request.password.filter(|value| !value.is_empty()),
        refresh_interval_hours: request
            .refresh_interval_hours
            .unwrap_or(current.refresh_interval_hours),
        notification_lead_hours: request
            .notification_lead_hours
            .unwrap_or(current.notification_lead_hours),
    }
    .normalized();
    state.credential_store.save(&credentials)?;

    if let Some(timezone) = timezone {
        let mut settings = load_settings(&state.config_dir)?;
        settings.timezone = timezone;
        save_settings(&state.config_dir, &settings)?;
    }

    let refresh = match state.coordinator.refresh().await {
        Ok(outcome) => describe_outcome(&outcome),
        Err(error) => format!("failed: {error}"),
    };
    state.log_info("configure", &refresh);

    Ok(ConfigureResponse {
        username: credentials.username.unwrap_or_default(),
        refresh_interval_hours: credentials.refresh_interval_hours,
        notification_lead_hours: credentials.notification_lead_hours,
        refresh,
    })
}

/// Errors are shared with any caller that joined the same in-flight run.
pub async fn refresh_impl<V>(state: &AppState<V>) -> Result<String, Arc<InfraError>>
where
    V: PasswordVault + 'static,
{
    let outcome = state.coordinator.refresh().await?;
    let message = describe_outcome(&outcome);
    state.log_info("refresh", &message);
    Ok(message)
}

pub async fn status_impl<V>(state: &AppState<V>, days: u32) -> Result<String, InfraError>
where
    V: PasswordVault + 'static,
{
    let settings = load_settings(&state.config_dir)?;
    let service = StatusService::new(
        reqwest_transport_factory(),
        Arc::clone(&state.credential_store),
        DisplayZone::from_name(settings.timezone.as_deref()),
    )
    .with_endpoints(state.endpoints.clone());
    let view = service.load(days.max(1)).await;
    state.log_info("status", &format!("{view:?}"));
    Ok(view.to_string())
}

pub fn list_impl<V>(state: &AppState<V>) -> Result<Vec<WidgetRow>, InfraError>
where
    V: PasswordVault + 'static,
{
    Ok(load_widget_snapshot(&state.state_dir)?
        .map(|snapshot| snapshot.items)
        .unwrap_or_default())
}

/// Runs the periodic scheduler until `shutdown` fires. The interval is
/// re-read from `settings.json` every cycle and on every poll, so `configure`
/// in another process reschedules a running `watch`.
pub async fn watch_impl<V>(
    state: &AppState<V>,
    shutdown: watch::Receiver<bool>,
) -> Result<usize, InfraError>
where
    V: PasswordVault + 'static,
{
    let config_dir = state.config_dir.clone();
    let scheduler = RefreshScheduler::new(
        Arc::clone(&state.coordinator),
        Arc::new(move || {
            load_settings(&config_dir)
                .map(|settings| settings.refresh_interval_hours)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_HOURS)
        }),
    );
    let runs = scheduler.run(shutdown).await;
    state.log_info("watch", &format!("stopped after {runs} refreshes"));
    Ok(runs)
}
