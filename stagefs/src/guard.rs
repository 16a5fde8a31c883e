use std::fmt::Display;
use std::future::Future;

use stagefs_core::StagingError;

use crate::error::EngineError;

/// Errors that can carry the server's session-expired signal.
pub trait SessionExpiry {
    fn is_session_expired(&self) -> bool;
}

impl SessionExpiry for StagingError {
    fn is_session_expired(&self) -> bool {
        StagingError::is_session_expired(self)
    }
}

impl SessionExpiry for EngineError {
    fn is_session_expired(&self) -> bool {
        EngineError::is_session_expired(self)
    }
}

impl SessionExpiry for anyhow::Error {
    fn is_session_expired(&self) -> bool {
        if let Some(err) = self.downcast_ref::<EngineError>() {
            return err.is_session_expired();
        }
        self.downcast_ref::<StagingError>()
            .is_some_and(StagingError::is_session_expired)
    }
}

/// Runs `op`; if it fails because the session expired, logs in again via
/// `relogin` and runs `op` exactly once more, returning whatever that second
/// attempt returns. A failed re-login yields the original error.
pub async fn with_session_retry<T, E, Op, OpFut, Relogin, ReloginFut, ReloginErr>(
    mut op: Op,
    relogin: Relogin,
) -> Result<T, E>
where
    E: SessionExpiry,
    Op: FnMut() -> OpFut,
    OpFut: Future<Output = Result<T, E>>,
    Relogin: FnOnce() -> ReloginFut,
    ReloginFut: Future<Output = Result<(), ReloginErr>>,
    ReloginErr: Display,
{
    let err = match op().await {
        Err(err) if err.is_session_expired() => err,
        other => return other,
    };

    tracing::info!("Session expired, auto login");
    match relogin().await {
        Ok(()) => op().await,
        Err(login_err) => {
            tracing::error!("auto login failed: {login_err}");
            Err(err)
        }
    }
}
