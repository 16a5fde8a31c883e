use keyring::Entry;
use thiserror::Error;

const SERVICE_NAME: &str = "io.stagefs.cli";
const PASSWORD_ENV: &str = "STAGEFS_PASSWORD";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("keyring error: {0}")]
    KeyringError(#[from] keyring::Error),
    #[error("no saved password for {0}")]
    PasswordNotFound(String),
}

/// Password storage in the OS keyring, one entry per username.
pub struct CredentialStore {
    username: String,
    entry: Entry,
}

impl CredentialStore {
    pub fn new(username: &str) -> Result<Self, CredentialError> {
        Ok(Self {
            username: username.to_string(),
            entry: Entry::new(SERVICE_NAME, username)?,
        })
    }

    pub fn save_password(&self, password: &str) -> Result<(), CredentialError> {
        self.entry.set_password(password)?;
        Ok(())
    }

    /// `STAGEFS_PASSWORD` wins over the keyring.
    pub fn password(&self) -> Result<String, CredentialError> {
        if let Some(password) = password_from_env() {
            return Ok(password);
        }
        match self.entry.get_password() {
            Ok(password) => Ok(password),
            Err(keyring::Error::NoEntry) => {
                Err(CredentialError::PasswordNotFound(self.username.clone()))
            }
            Err(err) => Err(CredentialError::KeyringError(err)),
        }
    }

    pub fn delete_password(&self) -> Result<(), CredentialError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(CredentialError::KeyringError(err)),
        }
    }
}

pub fn password_from_env() -> Option<String> {
    std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|value| !value.is_empty())
}
