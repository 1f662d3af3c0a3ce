use crate::domain::models::Credentials;
use crate::infrastructure::config::{load_settings, save_settings};
use crate::infrastructure::error::InfraError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const KEYRING_SERVICE: &str = "moodle-deadlines.password";

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Credentials, InfraError>;
    fn save(&self, credentials: &Credentials) -> Result<(), InfraError>;
}

pub trait PasswordVault: Send + Sync {
    fn load_password(&self, username: &str) -> Result<Option<String>, InfraError>;
    fn save_password(&self, username: &str, password: &str) -> Result<(), InfraError>;
    fn delete_password(&self, username: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringPasswordVault {
    service_name: String,
}

impl KeyringPasswordVault {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, username: &str) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, username)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringPasswordVault {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl PasswordVault for KeyringPasswordVault {
    fn load_password(&self, username: &str) -> Result<Option<String>, InfraError> {
        match self.entry(username)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }

    fn save_password(&self, username: &str, password: &str) -> Result<(), InfraError> {
        self.entry(username)?
            .set_password(password)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn delete_password(&self, username: &str) -> Result<(), InfraError> {
        match self.entry(username)?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPasswordVault {
    passwords: Mutex<HashMap<String, String>>,
}

impl InMemoryPasswordVault {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, InfraError> {
        self.passwords
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))
    }
}

impl PasswordVault for InMemoryPasswordVault {
    fn load_password(&self, username: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(username).cloned())
    }

    fn save_password(&self, username: &str, password: &str) -> Result<(), InfraError> {
        self.lock()?
            .insert(username.to_string(), password.to_string());
        Ok(())
    }

    fn delete_password(&self, username: &str) -> Result<(), InfraError> {
        self.lock()?.remove(username);
        Ok(())
    }
}

/// Username and schedule live in `settings.json`; the password lives in the
/// vault under the username.
#[derive(Debug)]
pub struct SettingsCredentialStore<V>
where
    V: PasswordVault,
{
    config_dir: PathBuf,
    vault: V,
}

impl<V> SettingsCredentialStore<V>
where
    V: PasswordVault,
{
    pub fn new(config_dir: impl AsRef<Path>, vault: V) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            vault,
        }
    }
}

impl<V> CredentialStore for SettingsCredentialStore<V>
where
    V: PasswordVault,
{
    fn load(&self) -> Result<Credentials, InfraError> {
        let settings = load_settings(&self.config_dir)?;
        let password = match settings.username.as_deref() {
            Some(username) => self.vault.load_password(username)?,
            None => None,
        };
        tracing::debug!(
            has_username = settings.username.is_some(),
            has_password = password.is_some(),
            "loaded credentials"
        );
        Ok(Credentials {
            username: settings.username.clone(),
            password,
            refresh_interval_hours: settings.refresh_interval_hours(),
            notification_lead_hours: settings.notification_lead_hours(),
        })
    }

    fn save(&self, credentials: &Credentials) -> Result<(), InfraError> {
        let credentials = credentials.clone().normalized();
        let username = credentials
            .username
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| InfraError::InvalidConfig("username must not be empty".to_string()))?;

        let mut settings = load_settings(&self.config_dir)?;
        if let Some(previous) = settings.username.as_deref().filter(|previous| *previous != username)
        {
            self.vault.delete_password(previous)?;
        }
        if let Some(password) = credentials.password.as_deref().filter(|value| !value.is_empty()) {
            self.vault.save_password(username, password)?;
        }

        settings.username = Some(username.to_string());
        settings.refresh_interval_hours = credentials.refresh_interval_hours;
        settings.notification_lead_hours = credentials.notification_lead_hours;
        save_settings(&self.config_dir, &settings)?;
        tracing::info!(
            refresh_interval_hours = credentials.refresh_interval_hours,
            notification_lead_hours = credentials.notification_lead_hours,
            "saved credentials"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: Mutex<Option<Credentials>>,
}

impl InMemoryCredentialStore {
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self) -> Result<Credentials, InfraError> {
        let guard = self
            .credentials
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), InfraError> {
        let mut guard = self
            .credentials
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = Some(credentials.clone().normalized());
        Ok(())
    }
}
