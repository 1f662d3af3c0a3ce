use crate::application::session_client::{MoodleSessionClient, NowProvider};
use crate::domain::deadlines::find_due_events;
use crate::domain::models::AssignmentEvent;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::moodle_api::MoodleEndpoints;
use crate::infrastructure::moodle_transport::MoodleTransport;
use crate::infrastructure::notifier::{Notification, Notifier};
use crate::infrastructure::widget_store::WidgetDisplay;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

pub const FETCH_LOOKAHEAD_DAYS: i64 = 30;

/// Builds a fresh transport (and with it a fresh cookie jar) for one run.
pub type TransportFactory<T> = Arc<dyn Fn() -> Result<Arc<T>, InfraError> + Send + Sync>;

#[async_trait]
pub trait RefreshRunner: Send + Sync {
    async fn run_refresh(&self) -> Result<RefreshOutcome, InfraError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    NoActiveWidgets,
    Refreshed { fetched: usize, notified: usize },
    /// Login or fetch failed; the widget was still cleared and republished.
    Degraded { reason: String },
}

pub struct RefreshOrchestrator<T, S, N, W>
where
    T: MoodleTransport,
    S: CredentialStore,
    N: Notifier,
    W: WidgetDisplay,
{
    transport_factory: TransportFactory<T>,
    credential_store: Arc<S>,
    notifier: Arc<N>,
    widget: Arc<W>,
    endpoints: MoodleEndpoints,
    now_provider: NowProvider,
}

impl<T, S, N, W> RefreshOrchestrator<T, S, N, W>
where
    T: MoodleTransport,
    S: CredentialStore,
    N: Notifier,
    W: WidgetDisplay,
{
    pub fn new(
        transport_factory: TransportFactory<T>,
        credential_store: Arc<S>,
        notifier: Arc<N>,
        widget: Arc<W>,
    ) -> Self {
        Self {
            transport_factory,
            credential_store,
            notifier,
            widget,
            endpoints: MoodleEndpoints::default(),
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

    /// One refresh run. Only missing credentials and credential store
    /// failures are errors; every session failure degrades the outcome.
    pub async fn run_refresh(&self) -> Result<RefreshOutcome, InfraError> {
        if self.widget.active_instances() == 0 {
            tracing::info!("no active widget instances; skipping refresh");
            return Ok(RefreshOutcome::NoActiveWidgets);
        }

        let credentials = self.credential_store.load()?;
        let Some((username, password)) = credentials.login_pair() else {
            tracing::warn!("refresh aborted: credentials are not configured");
            return Err(InfraError::MissingCredentials);
        };

        let (events, outcome) = match self.login_and_fetch(username, password).await {
            Ok(events) => {
                let notified = self
                    .notify_due(&events, credentials.notification_lead_hours)
                    .await;
                let fetched = events.len();
                (events, RefreshOutcome::Refreshed { fetched, notified })
            }
            Err(error) => {
                if error.is_transient() {
                    tracing::warn!(%error, "refresh degraded");
                } else {
                    tracing::error!(%error, "refresh degraded");
                }
                (
                    Vec::new(),
                    RefreshOutcome::Degraded {
                        reason: error.to_string(),
                    },
                )
            }
        };

        self.widget.set_list(&events);
        if let Err(error) = self.widget.request_refresh() {
            tracing::warn!(%error, "widget refresh failed");
        }
        tracing::info!(?outcome, "refresh finished");
        Ok(outcome)
    }

    async fn login_and_fetch(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Vec<AssignmentEvent>, InfraError> {
        let transport = (self.transport_factory)()?;
        let client = MoodleSessionClient::new(transport, self.endpoints.clone())
            .with_now_provider(Arc::clone(&self.now_provider));
        let session_key = client.login(username, password).await?;
        client.fetch_events(&session_key, FETCH_LOOKAHEAD_DAYS).await
    }

    async fn notify_due(&self, events: &[AssignmentEvent], lead_hours: u32) -> usize {
        if let Err(error) = self.notifier.ensure_channel().await {
            tracing::warn!(%error, "notification channel unavailable");
            return 0;
        }
        let due = find_due_events(events, (self.now_provider)(), lead_hours);
        if due.is_empty() {
            return 0;
        }
        if !self.notifier.permission_granted() {
            tracing::warn!(due = due.len(), "notification permission missing; skipping notifications");
            return 0;
        }

        let mut notified = 0;
        for event in &due {
            let notification = Notification::for_event(event, lead_hours);
            match self.notifier.notify(&notification).await {
                Ok(()) => notified += 1,
                Err(InfraError::PermissionDenied(reason)) => {
                    tracing::warn!(id = notification.id, %reason, "notification suppressed");
                }
                Err(error) => {
                    tracing::warn!(id = notification.id, %error, "notification failed");
                }
            }
        }
        notified
    }
}

#[async_trait]
impl<T, S, N, W> RefreshRunner for RefreshOrchestrator<T, S, N, W>
where
    T: MoodleTransport,
    S: CredentialStore,
    N: Notifier,
    W: WidgetDisplay,
{
    async fn run_refresh(&self) -> Result<RefreshOutcome, InfraError> {
        Self::run_refresh(self).await
    }
}
