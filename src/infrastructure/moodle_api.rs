use crate::domain::models::AssignmentEvent;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://moodle2025.mc2.osakac.ac.jp/2025";
pub const CALENDAR_EVENTS_METHOD: &str = "core_calendar_get_action_events_by_timesort";
pub const EVENTS_LIMIT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoodleEndpoints {
    base: Url,
}

impl MoodleEndpoints {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        let base = Url::parse(base_url.trim())
            .map_err(|error| InfraError::InvalidConfig(format!("invalid moodle base url: {error}")))?;
        if base.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "moodle base url cannot be a base: {base_url}"
            )));
        }
        Ok(Self { base })
    }

    pub fn host(&self) -> Option<&str> {
        self.base.host_str()
    }

    pub fn login_url(&self) -> Result<Url, InfraError> {
        self.with_segments(&["login", "index.php"])
    }

    pub fn ajax_url(&self, session_key: &str, method: &str) -> Result<Url, InfraError> {
        let mut url = self.with_segments(&["lib", "ajax", "service.php"])?;
        url.query_pairs_mut()
            .append_pair("sesskey", session_key)
            .append_pair("info", method);
        Ok(url)
    }

    fn with_segments(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("moodle base url cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }
}

impl Default for MoodleEndpoints {
    fn default() -> Self {
        Self {
            base: Url::parse(DEFAULT_BASE_URL).expect("valid default moodle url"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AjaxRequest<'a> {
    pub index: u32,
    pub methodname: &'a str,
    pub args: AjaxEventArgs,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AjaxEventArgs {
    pub limitnum: u32,
    pub timesortfrom: i64,
    pub timesortto: i64,
    pub limittononsuspendedevents: bool,
}

pub fn events_request(
    time_from: DateTime<Utc>,
    time_to: DateTime<Utc>,
) -> Vec<AjaxRequest<'static>> {
    vec![AjaxRequest {
        index: 0,
        methodname: CALENDAR_EVENTS_METHOD,
        args: AjaxEventArgs {
            limitnum: EVENTS_LIMIT,
            timesortfrom: time_from.timestamp(),
            timesortto: time_to.timestamp(),
            limittononsuspendedevents: true,
        },
    }]
}

#[derive(Debug, Deserialize)]
struct AjaxResponse {
    #[serde(default)]
    data: Option<AjaxEventsData>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    exception: Option<AjaxException>,
}

#[derive(Debug, Deserialize)]
struct AjaxEventsData {
    #[serde(default)]
    events: Vec<AssignmentEvent>,
}

#[derive(Debug, Deserialize)]
struct AjaxException {
    #[serde(default)]
    message: Option<String>,
}

/// Decodes the AJAX envelope array. Only the first element is consulted.
/// An empty array decodes to no events; an error flag becomes `ApiError`.
pub fn decode_events_response(body: &str) -> Result<Vec<AssignmentEvent>, InfraError> {
    let responses: Vec<AjaxResponse> = serde_json::from_str(body)
        .map_err(|error| InfraError::ParseError(format!("invalid ajax payload: {error}")))?;
    let Some(first) = responses.into_iter().next() else {
        return Ok(Vec::new());
    };
    if first.error {
        let message = first
            .exception
            .and_then(|exception| exception.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| "Unknown API error".to_string());
        return Err(InfraError::ApiError(message));
    }
    Ok(first.data.map(|data| data.events).unwrap_or_default())
}
