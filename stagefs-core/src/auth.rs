use serde::{Deserialize, Serialize};

use crate::client::{StagingClient, StagingError};
use crate::model::RemoteFault;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthResult {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<i64>,
    #[serde(rename = "vaultId", default)]
    pub vault_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
    #[serde(rename = "userId", default)]
    user_id: Option<i64>,
    #[serde(rename = "vaultId", default)]
    vault_id: Option<i64>,
    #[serde(default)]
    errors: Vec<RemoteFault>,
}

impl StagingClient {
    /// Password login. On success the returned session id becomes the
    /// bearer token of this client and every clone of it.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResult, StagingError> {
        let url = self.endpoint("auth")?;
        let form = [("username", username), ("password", password)];
        let response = self.http().post(url).form(&form).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        let payload: AuthResponse = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(_) if !status.is_success() => {
                return Err(StagingError::Api {
                    status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        if let Some(fault) = payload.errors.into_iter().next() {
            return Err(StagingError::Remote {
                kind: fault.kind,
                message: fault.message,
            });
        }
        let session_id = payload.session_id.ok_or(StagingError::EmptyResponse)?;
        self.set_session(session_id.clone());
        Ok(AuthResult {
            session_id,
            user_id: payload.user_id,
            vault_id: payload.vault_id,
        })
    }
}
