use std::io;

use stagefs_core::StagingError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::CredentialError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Api(#[from] StagingError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("transfer of {path} failed{}: {source}", part_label(.part_number))]
    Transfer {
        path: String,
        part_number: Option<u64>,
        #[source]
        source: TransferCause,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("job {job_id} not completed within {timeout_secs} seconds")]
    JobTimeout { job_id: i64, timeout_secs: u64 },
    #[error("download integrity check failed for {path}: expected {expected_md5}, got {actual_md5}")]
    IntegrityMismatch {
        path: String,
        expected_md5: String,
        actual_md5: String,
    },
    #[error("not logged in, run `stagefs login` first")]
    NotLoggedIn,
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("automatic re-login failed: {0}")]
    Relogin(String),
}

/// What broke in the middle of moving bytes.
#[derive(Debug, Error)]
pub enum TransferCause {
    #[error(transparent)]
    Remote(#[from] StagingError),
    #[error("local I/O: {0}")]
    Local(#[from] io::Error),
}

fn part_label(part_number: &Option<u64>) -> String {
    part_number
        .map(|part| format!(" at part {part}"))
        .unwrap_or_default()
}

impl EngineError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        EngineError::InvalidInput(message.into())
    }

    pub fn transfer(
        path: impl Into<String>,
        part_number: Option<u64>,
        source: impl Into<TransferCause>,
    ) -> Self {
        EngineError::Transfer {
            path: path.into(),
            part_number,
            source: source.into(),
        }
    }

    pub fn is_session_expired(&self) -> bool {
        match self {
            EngineError::Api(err)
            | EngineError::Transfer {
                source: TransferCause::Remote(err),
                ..
            } => err.is_session_expired(),
            _ => false,
        }
    }
}
