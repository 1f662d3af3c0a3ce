use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const DEFAULT_REFRESH_INTERVAL_HOURS: u32 = 6;
pub const DEFAULT_NOTIFICATION_LEAD_HOURS: u32 = 12;
pub const MIN_HOURS: u32 = 1;
pub const NOTIFICATION_ID_OFFSET: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_interval_hours: u32,
    pub notification_lead_hours: u32,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            refresh_interval_hours: DEFAULT_REFRESH_INTERVAL_HOURS,
            notification_lead_hours: DEFAULT_NOTIFICATION_LEAD_HOURS,
        }
    }
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        refresh_interval_hours: u32,
        notification_lead_hours: u32,
    ) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            refresh_interval_hours,
            notification_lead_hours,
        }
        .normalized()
    }

    /// Coerces both hour settings to at least one hour.
    pub fn normalized(mut self) -> Self {
        self.refresh_interval_hours = self.refresh_interval_hours.max(MIN_HOURS);
        self.notification_lead_hours = self.notification_lead_hours.max(MIN_HOURS);
        self
    }

    /// Returns the login pair only when both halves are non-blank.
    pub fn login_pair(&self) -> Option<(&str, &str)> {
        let username = self
            .username
            .as_deref()
            .filter(|value| !value.trim().is_empty())?;
        let password = self
            .password
            .as_deref()
            .filter(|value| !value.trim().is_empty())?;
        Some((username.trim(), password))
    }

    pub fn has_login(&self) -> bool {
        self.login_pair().is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MoodleCourse {
    #[serde(default)]
    pub fullname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentEvent {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub viewurl: String,
    #[serde(default)]
    pub course: Option<MoodleCourse>,
    #[serde(default)]
    pub timesort: Option<i64>,
}

impl AssignmentEvent {
    pub fn has_view_url(&self) -> bool {
        !self.viewurl.trim().is_empty()
    }

    /// Missing or out-of-range timestamps collapse to the Unix epoch.
    pub fn due_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timesort.unwrap_or(0), 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn course_name(&self) -> Option<&str> {
        self.course
            .as_ref()
            .map(|course| course.fullname.trim())
            .filter(|name| !name.is_empty())
    }

    /// Server id when present, otherwise a content hash. Hash keys can collide
    /// and are only stable within one build of the binary.
    pub fn identity_key(&self) -> i64 {
        if let Some(id) = self.id {
            return id;
        }
        let mut hasher = DefaultHasher::new();
        self.name.hash(&mut hasher);
        self.viewurl.hash(&mut hasher);
        self.course.hash(&mut hasher);
        self.timesort.hash(&mut hasher);
        i64::from(hasher.finish() as i32)
    }

    pub fn notification_id(&self) -> i64 {
        NOTIFICATION_ID_OFFSET.wrapping_add(self.identity_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(id: Option<i64>) -> AssignmentEvent {
        AssignmentEvent {
            id,
            name: "Report 3".to_string(),
            viewurl: "https://moodle.example.test/mod/assign/view.php?id=42".to_string(),
            course: Some(MoodleCourse {
                fullname: "Operating Systems".to_string(),
            }),
            timesort: Some(1_700_000_000),
        }
    }

    #[test]
    fn credentials_default_to_six_and_twelve_hours() {
        let credentials = Credentials::default();
        assert_eq!(credentials.refresh_interval_hours, 6);
        assert_eq!(credentials.notification_lead_hours, 12);
        assert!(!credentials.has_login());
    }

    #[test]
    fn credentials_coerce_hours_to_minimum() {
        let credentials = Credentials::new("alice", "secret", 0, 0);
        assert_eq!(credentials.refresh_interval_hours, 1);
        assert_eq!(credentials.notification_lead_hours, 1);
    }

    #[test]
    fn blank_username_or_password_is_not_a_login() {
        let mut credentials = Credentials::new("  ", "secret", 6, 12);
        assert!(credentials.login_pair().is_none());

        credentials.username = Some("alice".to_string());
        credentials.password = Some(" ".to_string());
        assert!(credentials.login_pair().is_none());

        credentials.password = Some("secret".to_string());
        assert_eq!(credentials.login_pair(), Some(("alice", "secret")));
    }

    #[test]
    fn event_decodes_server_shape() {
        let raw = r#"{"id":7,"name":"HW1","viewurl":"https://x/view","course":{"fullname":"CS101"},"timesort":1700000000,"extra":true}"#;
        let event: AssignmentEvent = serde_json::from_str(raw).expect("decode event");
        assert_eq!(event.id, Some(7));
        assert_eq!(event.course_name(), Some("CS101"));
        assert_eq!(event.due_at().timestamp(), 1_700_000_000);
    }

    #[test]
    fn missing_due_time_defaults_to_epoch() {
        let event: AssignmentEvent =
            serde_json::from_str(r#"{"name":"HW","viewurl":"u"}"#).expect("decode event");
        assert_eq!(event.due_at(), DateTime::<Utc>::UNIX_EPOCH);
        assert!(event.course_name().is_none());
    }

    #[test]
    fn notification_id_uses_server_id_with_offset() {
        assert_eq!(sample_event(Some(42)).notification_id(), 1042);
    }

    #[test]
    fn notification_id_falls_back_to_stable_content_hash() {
        let first = sample_event(None);
        let second = sample_event(None);
        assert_eq!(first.notification_id(), second.notification_id());

        let mut renamed = sample_event(None);
        renamed.name = "Report 4".to_string();
        assert_ne!(first.identity_key(), renamed.identity_key());
    }
}
