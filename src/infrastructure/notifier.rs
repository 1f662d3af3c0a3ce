use crate::domain::models::AssignmentEvent;
use crate::infrastructure::config::Settings;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;

pub const CHANNEL_ID: &str = "moodle_deadlines";
const JOURNAL_FILE: &str = "notifications.jsonl";
const NOTIFY_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub url: String,
}

impl Notification {
    pub fn for_event(event: &AssignmentEvent, lead_hours: u32) -> Self {
        let course = event.course_name().unwrap_or("unknown course");
        Self {
            id: event.notification_id(),
            title: format!("Assignment due soon: {}", event.name),
            body: format!("Due within {lead_hours} hours ({course})"),
            url: event.viewurl.clone(),
        }
    }
}

/// Desktop notification seam. Callers check `permission_granted` once per run
/// and post nothing without it. `notify` may still fail with
/// `PermissionDenied`; the caller skips that notification and continues.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn ensure_channel(&self) -> Result<(), InfraError>;
    fn permission_granted(&self) -> bool;
    async fn notify(&self, notification: &Notification) -> Result<(), InfraError>;
}

/// Appends every notification to `state/notifications.jsonl`. Posting the same
/// id twice appends twice; readers keep the last line per id.
#[derive(Debug)]
pub struct JournalNotifier {
    path: PathBuf,
    enabled: bool,
    write_guard: Mutex<()>,
}

impl JournalNotifier {
    pub fn new(state_dir: &Path, enabled: bool) -> Self {
        Self {
            path: state_dir.join(JOURNAL_FILE),
            enabled,
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, notification: &Notification) -> Result<(), InfraError> {
        let _guard = self
            .write_guard
            .lock()
            .map_err(|error| InfraError::Io(std::io::Error::other(error.to_string())))?;
        let line = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "channel": CHANNEL_ID,
            "notification": notification,
        });
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for JournalNotifier {
    async fn ensure_channel(&self) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn permission_granted(&self) -> bool {
        self.enabled
    }

    async fn notify(&self, notification: &Notification) -> Result<(), InfraError> {
        if !self.enabled {
            return Err(InfraError::PermissionDenied(
                "notifications are disabled in settings".to_string(),
            ));
        }
        self.append(notification)?;
        tracing::info!(id = notification.id, title = %notification.title, "posted notification");
        Ok(())
    }
}

/// Runs an external program (for example `notify-send`) with title and body
/// appended to the configured arguments, then records the notification in the
/// journal. A program still running after the timeout is killed and the
/// notification is skipped.
#[derive(Debug)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
    journal: JournalNotifier,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>, args: Vec<String>, journal: JournalNotifier) -> Self {
        Self {
            program: program.into(),
            args,
            journal,
            timeout: NOTIFY_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn ensure_channel(&self) -> Result<(), InfraError> {
        self.journal.ensure_channel().await
    }

    fn permission_granted(&self) -> bool {
        self.journal.permission_granted()
    }

    async fn notify(&self, notification: &Notification) -> Result<(), InfraError> {
        if !self.permission_granted() {
            return Err(InfraError::PermissionDenied(
                "notifications are disabled in settings".to_string(),
            ));
        }
        let run = Command::new(&self.program)
            .args(&self.args)
            .arg(&notification.title)
            .arg(&notification.body)
            .kill_on_drop(true)
            .status();
        let status = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| {
                InfraError::PermissionDenied(format!(
                    "{} did not finish within {}s",
                    self.program,
                    self.timeout.as_secs_f32()
                ))
            })?
            .map_err(|error| {
                InfraError::PermissionDenied(format!("failed to run {}: {error}", self.program))
            })?;
        if !status.success() {
            return Err(InfraError::PermissionDenied(format!(
                "{} exited with {status}",
                self.program
            )));
        }
        self.journal.notify(notification).await
    }
}

/// Notifier chosen from settings: the external command when `notifyCommand`
/// is set, otherwise the journal alone.
#[derive(Debug)]
pub enum ConfiguredNotifier {
    Journal(JournalNotifier),
    Command(CommandNotifier),
}

impl ConfiguredNotifier {
    pub fn from_settings(settings: &Settings, state_dir: &Path) -> Self {
        let journal = JournalNotifier::new(state_dir, settings.notifications_enabled);
        match settings.notify_program() {
            Some((program, args)) => {
                Self::Command(CommandNotifier::new(program, args.to_vec(), journal))
            }
            None => Self::Journal(journal),
        }
    }
}

#[async_trait]
impl Notifier for ConfiguredNotifier {
    async fn ensure_channel(&self) -> Result<(), InfraError> {
        match self {
            Self::Journal(notifier) => notifier.ensure_channel().await,
            Self::Command(notifier) => notifier.ensure_channel().await,
        }
    }

    fn permission_granted(&self) -> bool {
        match self {
            Self::Journal(notifier) => notifier.permission_granted(),
            Self::Command(notifier) => notifier.permission_granted(),
        }
    }

    async fn notify(&self, notification: &Notification) -> Result<(), InfraError> {
        match self {
            Self::Journal(notifier) => notifier.notify(notification).await,
            Self::Command(notifier) => notifier.notify(notification).await,
        }
    }
}
