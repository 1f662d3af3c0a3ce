use crate::domain::models::{DEFAULT_NOTIFICATION_LEAD_HOURS, DEFAULT_REFRESH_INTERVAL_HOURS, MIN_HOURS};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const SETTINGS_JSON: &str = "settings.json";
const SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub schema: u8,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_refresh_interval_hours")]
    pub refresh_interval_hours: u32,
    #[serde(default = "default_notification_lead_hours")]
    pub notification_lead_hours: u32,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_true")]
    pub widget_enabled: bool,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub notify_command: Option<Vec<String>>,
}

fn default_refresh_interval_hours() -> u32 {
    DEFAULT_REFRESH_INTERVAL_HOURS
}

fn default_notification_lead_hours() -> u32 {
    DEFAULT_NOTIFICATION_LEAD_HOURS
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema: SCHEMA_VERSION as u8,
            username: None,
            refresh_interval_hours: DEFAULT_REFRESH_INTERVAL_HOURS,
            notification_lead_hours: DEFAULT_NOTIFICATION_LEAD_HOURS,
            timezone: None,
            widget_enabled: true,
            notifications_enabled: true,
            notify_command: None,
        }
    }
}

impl Settings {
    pub fn refresh_interval_hours(&self) -> u32 {
        self.refresh_interval_hours.max(MIN_HOURS)
    }

    pub fn notification_lead_hours(&self) -> u32 {
        self.notification_lead_hours.max(MIN_HOURS)
    }

    /// Program and arguments of the desktop notification command, if configured.
    pub fn notify_program(&self) -> Option<(&str, &[String])> {
        let command = self.notify_command.as_deref()?;
        let (program, args) = command.split_first()?;
        let program = program.trim();
        if program.is_empty() {
            return None;
        }
        Some((program, args))
    }
}

pub fn ensure_default_settings(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(SETTINGS_JSON);
    if !path.exists() {
        write_settings(&path, &Settings::default())?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SCHEMA_VERSION {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_settings(config_dir: &Path) -> Result<Settings, InfraError> {
    let path = config_dir.join(SETTINGS_JSON);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let value = read_config(&path)?;
    let mut settings: Settings = serde_json::from_value(value)?;
    settings.username = settings
        .username
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    settings.timezone = settings
        .timezone
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    Ok(settings)
}

pub fn save_settings(config_dir: &Path, settings: &Settings) -> Result<(), InfraError> {
    fs::create_dir_all(config_dir)?;
    let mut normalized = settings.clone();
    normalized.schema = SCHEMA_VERSION as u8;
    normalized.refresh_interval_hours = settings.refresh_interval_hours();
    normalized.notification_lead_hours = settings.notification_lead_hours();
    write_settings(&config_dir.join(SETTINGS_JSON), &normalized)
}

fn write_settings(path: &Path, settings: &Settings) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(settings)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    pub struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        pub fn new(label: &str) -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "moodle-deadlines-{label}-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TempWorkspace;
    use super::*;

    #[test]
    fn default_settings_are_written_once() {
        let workspace = TempWorkspace::new("config-default");
        ensure_default_settings(workspace.path()).expect("ensure defaults");

        let mut settings = load_settings(workspace.path()).expect("load settings");
        assert_eq!(settings, Settings::default());

        settings.username = Some("alice".to_string());
        save_settings(workspace.path(), &settings).expect("save settings");
        ensure_default_settings(workspace.path()).expect("ensure defaults again");

        let reloaded = load_settings(workspace.path()).expect("reload settings");
        assert_eq!(reloaded.username.as_deref(), Some("alice"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let workspace = TempWorkspace::new("config-missing");
        let settings = load_settings(&workspace.path().join("absent")).expect("load settings");
        assert_eq!(settings.refresh_interval_hours, 6);
        assert_eq!(settings.notification_lead_hours, 12);
    }

    #[test]
    fn save_clamps_hours_to_minimum() {
        let workspace = TempWorkspace::new("config-clamp");
        let settings = Settings {
            refresh_interval_hours: 0,
            notification_lead_hours: 0,
            ..Settings::default()
        };
        save_settings(workspace.path(), &settings).expect("save settings");

        let reloaded = load_settings(workspace.path()).expect("reload settings");
        assert_eq!(reloaded.refresh_interval_hours, 1);
        assert_eq!(reloaded.notification_lead_hours, 1);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let workspace = TempWorkspace::new("config-schema");
        fs::write(workspace.path().join(SETTINGS_JSON), r#"{"schema":2}"#).expect("write");

        match load_settings(workspace.path()) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("unsupported schema 2")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn partial_file_fills_defaults_and_trims_blanks() {
        let workspace = TempWorkspace::new("config-partial");
        fs::write(
            workspace.path().join(SETTINGS_JSON),
            r#"{"schema":1,"username":"  ","timezone":" Asia/Tokyo ","notifyCommand":["notify-send","-a","moodle"]}"#,
        )
        .expect("write");

        let settings = load_settings(workspace.path()).expect("load settings");
        assert_eq!(settings.username, None);
        assert_eq!(settings.timezone.as_deref(), Some("Asia/Tokyo"));
        assert!(settings.widget_enabled);
        let (program, args) = settings.notify_program().expect("notify program");
        assert_eq!(program, "notify-send");
        assert_eq!(args, &["-a".to_string(), "moodle".to_string()]);
    }
}
