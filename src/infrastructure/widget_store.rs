use crate::domain::models::AssignmentEvent;
use crate::domain::presentation::{DisplayZone, WidgetRow, widget_rows};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const WIDGET_FILE: &str = "widget.json";
const SNAPSHOT_SCHEMA: u8 = 1;

/// Consumer of the refresh result. `set_list` stages rows and
/// `request_refresh` publishes them.
pub trait WidgetDisplay: Send + Sync {
    fn active_instances(&self) -> usize;
    fn set_list(&self, events: &[AssignmentEvent]);
    fn request_refresh(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSnapshot {
    pub schema: u8,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<WidgetRow>,
}

#[derive(Debug)]
pub struct FileWidgetDisplay {
    path: PathBuf,
    enabled: bool,
    zone: DisplayZone,
    staged: Mutex<Vec<WidgetRow>>,
}

impl FileWidgetDisplay {
    pub fn new(state_dir: &Path, enabled: bool, zone: DisplayZone) -> Self {
        Self {
            path: state_dir.join(WIDGET_FILE),
            enabled,
            zone,
            staged: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WidgetDisplay for FileWidgetDisplay {
    fn active_instances(&self) -> usize {
        usize::from(self.enabled)
    }

    fn set_list(&self, events: &[AssignmentEvent]) {
        let rows = widget_rows(events, &self.zone);
        if let Ok(mut staged) = self.staged.lock() {
            *staged = rows;
        }
    }

    fn request_refresh(&self) -> Result<(), InfraError> {
        let items = self
            .staged
            .lock()
            .map(|staged| staged.clone())
            .map_err(|error| InfraError::Io(std::io::Error::other(error.to_string())))?;
        let snapshot = WidgetSnapshot {
            schema: SNAPSHOT_SCHEMA,
            updated_at: Utc::now(),
            items,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let formatted = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&self.path, format!("{formatted}\n"))?;
        tracing::debug!(rows = snapshot.items.len(), path = %self.path.display(), "published widget snapshot");
        Ok(())
    }
}

/// Reads the last published snapshot. A missing file means nothing has been
/// published yet.
pub fn load_widget_snapshot(state_dir: &Path) -> Result<Option<WidgetSnapshot>, InfraError> {
    let path = state_dir.join(WIDGET_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)?;
    let snapshot: WidgetSnapshot = serde_json::from_str(&raw)?;
    if snapshot.schema != SNAPSHOT_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            snapshot.schema,
            path.display()
        )));
    }
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MoodleCourse;
    use crate::infrastructure::config::test_support::TempWorkspace;

    fn event(id: i64, name: &str) -> AssignmentEvent {
        AssignmentEvent {
            id: Some(id),
            name: name.to_string(),
            viewurl: format!("https://moodle.example.test/mod/assign/view.php?id={id}"),
            course: Some(MoodleCourse {
                fullname: "Compilers".to_string(),
            }),
            timesort: Some(1_700_000_000),
        }
    }

    #[test]
    fn published_rows_are_read_back() {
        let workspace = TempWorkspace::new("widget-publish");
        let display = FileWidgetDisplay::new(
            workspace.path(),
            true,
            DisplayZone::from_name(Some("Asia/Tokyo")),
        );

        display.set_list(&[event(1, "Parser"), event(2, "Codegen")]);
        display.request_refresh().expect("publish");

        let snapshot = load_widget_snapshot(workspace.path())
            .expect("load snapshot")
            .expect("snapshot present");
        assert_eq!(snapshot.items.len(), 2);
        assert_eq!(snapshot.items[0].title, "Parser");
        assert_eq!(snapshot.items[1].due_label, "Due: 11/15 07:13");
    }

    #[test]
    fn empty_list_replaces_stale_rows() {
        let workspace = TempWorkspace::new("widget-clear");
        let display = FileWidgetDisplay::new(workspace.path(), true, DisplayZone::Local);
        display.set_list(&[event(1, "Parser")]);
        display.request_refresh().expect("first publish");

        display.set_list(&[]);
        display.request_refresh().expect("second publish");

        let snapshot = load_widget_snapshot(workspace.path())
            .expect("load snapshot")
            .expect("snapshot present");
        assert!(snapshot.items.is_empty());
    }

    #[test]
    fn disabled_widget_reports_no_instances() {
        let workspace = TempWorkspace::new("widget-disabled");
        let display = FileWidgetDisplay::new(workspace.path(), false, DisplayZone::Local);
        assert_eq!(display.active_instances(), 0);
        assert!(load_widget_snapshot(workspace.path()).expect("load").is_none());
    }
}
