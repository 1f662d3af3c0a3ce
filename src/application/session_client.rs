use crate::domain::deadlines::saturating_add;
use crate::domain::models::AssignmentEvent;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::moodle_api::{
    decode_events_response, events_request, MoodleEndpoints, CALENDAR_EVENTS_METHOD,
};
use crate::infrastructure::moodle_html::{
    extract_login_token, extract_session_key, is_already_authenticated, is_authenticated_page,
};
use crate::infrastructure::moodle_transport::MoodleTransport;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    FetchedLoginPage,
    AlreadyAuthenticated,
    TokenExtracted,
    Authenticated,
    EventsFetched,
    Failed,
}

/// One authenticated conversation with Moodle. Built per refresh run on top of
/// a transport that owns that run's cookie jar.
pub struct MoodleSessionClient<T>
where
    T: MoodleTransport,
{
    transport: Arc<T>,
    endpoints: MoodleEndpoints,
    now_provider: NowProvider,
    state: Mutex<SessionState>,
}

impl<T> MoodleSessionClient<T>
where
    T: MoodleTransport,
{
    pub fn new(transport: Arc<T>, endpoints: MoodleEndpoints) -> Self {
        Self {
            transport,
            endpoints,
            now_provider: Arc::new(Utc::now),
            state: Mutex::new(SessionState::Init),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(SessionState::Failed)
    }

    fn transition(&self, next: SessionState) {
        if let Ok(mut state) = self.state.lock() {
            tracing::debug!(from = ?*state, to = ?next, "session state");
            *state = next;
        }
    }

    fn fail(&self, error: InfraError) -> InfraError {
        self.transition(SessionState::Failed);
        error
    }

    /// Logs in and returns the session key used by AJAX calls.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, InfraError> {
        let login_url = self.endpoints.login_url().map_err(|error| self.fail(error))?;

        let page = match self.transport.get(&login_url).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                return Err(self.fail(InfraError::NetworkUnreachable(format!(
                    "login page unreachable: HTTP {}",
                    response.status
                ))));
            }
            Err(error) => {
                return Err(self.fail(InfraError::NetworkUnreachable(format!(
                    "login page unreachable: {error}"
                ))));
            }
        };
        self.transition(SessionState::FetchedLoginPage);

        if is_already_authenticated(&page.body) {
            if let Some(session_key) = extract_session_key(&page.body) {
                self.transition(SessionState::AlreadyAuthenticated);
                tracing::info!("moodle session already authenticated");
                return Ok(session_key);
            }
        }

        let login_token = extract_login_token(&page.body)
            .ok_or_else(|| self.fail(InfraError::TokenNotFound))?;
        self.transition(SessionState::TokenExtracted);

        let form = [
            ("username", username),
            ("password", password),
            ("logintoken", login_token.as_str()),
            ("anchor", ""),
        ];
        let response = match self.transport.post_form(&login_url, &form).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                return Err(self.fail(InfraError::NetworkUnreachable(format!(
                    "login POST failed: HTTP {}",
                    response.status
                ))));
            }
            Err(error) => {
                return Err(self.fail(InfraError::NetworkUnreachable(format!(
                    "login POST failed: {error}"
                ))));
            }
        };

        if !is_authenticated_page(&response.body) {
            return Err(self.fail(InfraError::InvalidCredentials));
        }
        let session_key = extract_session_key(&response.body)
            .ok_or_else(|| self.fail(InfraError::SessionKeyNotFound))?;
        self.transition(SessionState::Authenticated);
        tracing::info!("moodle login succeeded");
        Ok(session_key)
    }

    /// Fetches action events due within `lookahead_days` from now. API and
    /// decode failures are logged and yield an empty list; only transport
    /// failures are returned as errors.
    pub async fn fetch_events(
        &self,
        session_key: &str,
        lookahead_days: i64,
    ) -> Result<Vec<AssignmentEvent>, InfraError> {
        let now = (self.now_provider)();
        let request = events_request(now, saturating_add(now, Duration::try_days(lookahead_days)));
        let body = serde_json::to_value(&request).map_err(|error| self.fail(error.into()))?;
        let url = self
            .endpoints
            .ajax_url(session_key, CALENDAR_EVENTS_METHOD)
            .map_err(|error| self.fail(error))?;

        let response = match self.transport.post_json(&url, &body).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                return Err(self.fail(InfraError::NetworkUnreachable(format!(
                    "API request failed: HTTP {}",
                    response.status
                ))));
            }
            Err(error) => {
                return Err(self.fail(InfraError::NetworkUnreachable(format!(
                    "API request failed: {error}"
                ))));
            }
        };

        if response.body.trim().is_empty() {
            self.transition(SessionState::EventsFetched);
            return Ok(Vec::new());
        }

        let events = match decode_events_response(&response.body) {
            Ok(events) => events,
            Err(error @ (InfraError::ApiError(_) | InfraError::ParseError(_))) => {
                tracing::warn!(%error, "moodle events response rejected");
                Vec::new()
            }
            Err(error) => return Err(self.fail(error)),
        };
        let events: Vec<AssignmentEvent> = events
            .into_iter()
            .filter(AssignmentEvent::has_view_url)
            .collect();
        self.transition(SessionState::EventsFetched);
        tracing::info!(count = events.len(), "fetched moodle events");
        Ok(events)
    }
}
