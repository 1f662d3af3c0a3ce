use crate::application::refresh::TransportFactory;
use crate::application::session_client::{MoodleSessionClient, NowProvider};
use crate::domain::presentation::{DisplayZone, StatusView, format_event_list};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::moodle_api::MoodleEndpoints;
use crate::infrastructure::moodle_transport::MoodleTransport;
use chrono::Utc;
use std::sync::Arc;

pub const STATUS_LOOKAHEAD_DAYS: u32 = 7;

/// Builds the human-readable status screen. Never fails: every problem is one
/// of the `StatusView` states.
pub struct StatusService<T, S>
where
    T: MoodleTransport,
    S: CredentialStore,
{
    transport_factory: TransportFactory<T>,
    credential_store: Arc<S>,
    endpoints: MoodleEndpoints,
    zone: DisplayZone,
    now_provider: NowProvider,
}

impl<T, S> StatusService<T, S>
where
    T: MoodleTransport,
    S: CredentialStore,
{
    pub fn new(
        transport_factory: TransportFactory<T>,
        credential_store: Arc<S>,
        zone: DisplayZone,
    ) -> Self {
        Self {
            transport_factory,
            credential_store,
            endpoints: MoodleEndpoints::default(),
            zone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_endpoints(mut self, endpoints: MoodleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn load(&self, days: u32) -> StatusView {
        let credentials = match self.credential_store.load() {
            Ok(credentials) => credentials,
            Err(error) => return StatusView::Error(error.to_string()),
        };
        let Some((username, password)) = credentials.login_pair() else {
            return StatusView::MissingCredentials;
        };
        let transport = match (self.transport_factory)() {
            Ok(transport) => transport,
            Err(error) => return StatusView::Error(error.to_string()),
        };

        let client = MoodleSessionClient::new(transport, self.endpoints.clone())
            .with_now_provider(Arc::clone(&self.now_provider));
        let session_key = match client.login(username, password).await {
            Ok(session_key) => session_key,
            Err(error) => {
                tracing::warn!(%error, "status login failed");
                return StatusView::LoginFailed;
            }
        };

        match client.fetch_events(&session_key, i64::from(days)).await {
            Ok(events) if events.is_empty() => StatusView::NoAssignments { days },
            Ok(events) => StatusView::Assignments(format_event_list(&events, &self.zone)),
            Err(error) => StatusView::Error(error.to_string()),
        }
    }
}
