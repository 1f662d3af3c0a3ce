use crate::domain::models::AssignmentEvent;
use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

const UNKNOWN_COURSE: &str = "unknown course";
const FULL_DUE_FORMAT: &str = "%Y-%m-%d (%a) %H:%M";
const SHORT_DUE_FORMAT: &str = "%m/%d %H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayZone {
    Local,
    Named(Tz),
}

impl DisplayZone {
    /// Unknown or blank zone names fall back to the system zone.
    pub fn from_name(name: Option<&str>) -> Self {
        name.map(str::trim)
            .filter(|value| !value.is_empty())
            .and_then(|value| value.parse::<Tz>().ok())
            .map(DisplayZone::Named)
            .unwrap_or(DisplayZone::Local)
    }

    pub fn format(&self, instant: DateTime<Utc>, pattern: &str) -> String {
        match self {
            DisplayZone::Local => instant.with_timezone(&Local).format(pattern).to_string(),
            DisplayZone::Named(zone) => instant.with_timezone(zone).format(pattern).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetRow {
    pub id: i64,
    pub title: String,
    pub course: String,
    pub due_at: DateTime<Utc>,
    pub due_label: String,
    pub url: String,
}

pub fn format_event_list(events: &[AssignmentEvent], zone: &DisplayZone) -> String {
    let mut output = String::new();
    for event in events {
        output.push_str(&format!("■ {}\n", event.name));
        output.push_str(&format!(
            "  Course: {}\n",
            event.course_name().unwrap_or(UNKNOWN_COURSE)
        ));
        output.push_str(&format!(
            "  Due: {}\n\n",
            zone.format(event.due_at(), FULL_DUE_FORMAT)
        ));
    }
    output
}

pub fn widget_rows(events: &[AssignmentEvent], zone: &DisplayZone) -> Vec<WidgetRow> {
    events
        .iter()
        .map(|event| WidgetRow {
            id: event.identity_key(),
            title: event.name.clone(),
            course: event.course_name().unwrap_or(UNKNOWN_COURSE).to_string(),
            due_at: event.due_at(),
            due_label: format!("Due: {}", zone.format(event.due_at(), SHORT_DUE_FORMAT)),
            url: event.viewurl.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusView {
    Loading,
    MissingCredentials,
    LoginFailed,
    NoAssignments { days: u32 },
    Assignments(String),
    Error(String),
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusView::Loading => write!(f, "Loading assignments..."),
            StatusView::MissingCredentials => write!(
                f,
                "No username or password saved. Run `configure` to store them first."
            ),
            StatusView::LoginFailed => {
                write!(f, "Login failed. Check your username and password.")
            }
            StatusView::NoAssignments { days } => {
                write!(f, "No assignments found (next {days} days).")
            }
            StatusView::Assignments(text) => write!(f, "{}", text.trim_end()),
            StatusView::Error(message) => write!(f, "An error occurred:\n{message}"),
        }
    }
}
