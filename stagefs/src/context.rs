use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use stagefs_core::{AuthResult, StagingClient};
use tokio::sync::OnceCell;

use crate::config::ConfigStore;
use crate::error::EngineError;
use crate::job::{JobPoller, PollSettings};
use crate::storage::CredentialStore;

const FOLDER_EXISTS: &str = "ITEM_NAME_EXISTS";

/// State owned by one command invocation and shared with its workers.
pub struct CommandContext {
    client: StagingClient,
    config: Arc<Mutex<ConfigStore>>,
    folders: FolderCache,
    jobs: ActiveJobs,
    poll: PollSettings,
    credentials: Option<(String, String)>,
    relogin: OnceCell<Result<(), String>>,
}

impl CommandContext {
    pub fn new(client: StagingClient, config: ConfigStore) -> Self {
        let poll = PollSettings::with_timeout(config.job_timeout());
        let config = Arc::new(Mutex::new(config));
        Self {
            client,
            jobs: ActiveJobs::new(Arc::clone(&config)),
            config,
            folders: FolderCache::default(),
            poll,
            credentials: None,
            relogin: OnceCell::new(),
        }
    }

    /// Re-login uses these instead of the configured username and keyring.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn client(&self) -> &StagingClient {
        &self.client
    }

    pub fn jobs(&self) -> &ActiveJobs {
        &self.jobs
    }

    pub fn poller(&self) -> JobPoller<'_> {
        JobPoller::new(&self.client, &self.jobs, self.poll)
    }

    pub fn with_config<R>(&self, f: impl FnOnce(&mut ConfigStore) -> R) -> R {
        let mut guard = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Kept for diagnostics only; resumption always asks the server.
    pub fn remember_upload_session(&self, session_id: &str) {
        let result = self.with_config(|config| {
            config.settings_mut().upload_session_id = Some(session_id.to_string());
            config.save()
        });
        if let Err(err) = result {
            tracing::warn!("failed to persist upload session id: {err}");
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResult, EngineError> {
        let started = Instant::now();
        let auth = self.client.login(username, password).await?;
        log_time("Login successful.", started);
        self.with_config(|config| {
            let settings = config.settings_mut();
            settings.username = Some(username.to_string());
            settings.auth_result = Some(auth.clone());
            config.save()
        })?;
        Ok(auth)
    }

    /// Logs in again with the stored credentials. Every caller within one
    /// command shares a single attempt and its outcome, so an expired
    /// session costs at most one login however many workers notice it.
    pub async fn relogin(&self) -> Result<(), EngineError> {
        self.relogin
            .get_or_init(|| async {
                self.login_with_stored_credentials()
                    .await
                    .map_err(|err| err.to_string())
            })
            .await
            .clone()
            .map_err(EngineError::Relogin)
    }

    async fn login_with_stored_credentials(&self) -> Result<(), EngineError> {
        let (username, password) = match &self.credentials {
            Some((username, password)) => (username.clone(), password.clone()),
            None => {
                let username = self
                    .with_config(|config| config.username())
                    .ok_or(EngineError::NotLoggedIn)?;
                let password = CredentialStore::new(&username)?.password()?;
                (username, password)
            }
        };
        self.login(&username, &password).await?;
        Ok(())
    }

    /// Creates a remote folder at most once per command. An existing folder
    /// is only reported in verbose mode. A failed create gives the path back
    /// so a retried command creates it again.
    pub async fn ensure_folder(
        &self,
        path: &str,
        overwrite: bool,
        verbose: bool,
    ) -> Result<(), EngineError> {
        if !self.folders.claim(path) {
            return Ok(());
        }
        let started = Instant::now();
        match self.client.create_folder(path, overwrite).await {
            Ok(()) => {
                if verbose {
                    log_time(&format!("created folder: {path}"), started);
                }
                Ok(())
            }
            Err(err) if err.remote_kind() == Some(FOLDER_EXISTS) && !verbose => Ok(()),
            Err(err) => {
                self.folders.release(path);
                Err(err.into())
            }
        }
    }
}

/// Remote folders already created (or known to exist) during this command.
#[derive(Debug)]
pub struct FolderCache {
    known: Mutex<HashSet<String>>,
}

impl Default for FolderCache {
    fn default() -> Self {
        let known = ["", ".", "/"].into_iter().map(String::from).collect();
        Self {
            known: Mutex::new(known),
        }
    }
}

impl FolderCache {
    /// Returns true when the caller is the first to ask for `path`.
    pub fn claim(&self, path: &str) -> bool {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string())
    }

    pub fn release(&self, path: &str) {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }
}

/// Jobs submitted but not yet seen succeeding, persisted in the config file
/// so they stay visible across runs.
#[derive(Clone)]
pub struct ActiveJobs {
    config: Arc<Mutex<ConfigStore>>,
}

impl ActiveJobs {
    fn new(config: Arc<Mutex<ConfigStore>>) -> Self {
        Self { config }
    }

    pub fn register(&self, job_id: i64, message: &str) {
        self.update(|jobs| {
            let key = job_id.to_string();
            if jobs.get(&key).map(String::as_str) == Some(message) {
                return false;
            }
            jobs.insert(key, message.to_string());
            true
        });
    }

    pub fn remove(&self, job_id: i64) {
        self.update(|jobs| jobs.remove(&job_id.to_string()).is_some());
    }

    pub fn contains(&self, job_id: i64) -> bool {
        self.snapshot().contains_key(&job_id.to_string())
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .settings()
            .active_jobs
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> bool) {
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        if !f(&mut config.settings_mut().active_jobs) {
            return;
        }
        if let Err(err) = config.save() {
            tracing::warn!("failed to persist active jobs: {err}");
        }
    }
}

pub fn log_time(message: &str, started: Instant) {
    tracing::info!(
        "[Duration: {:.3} seconds] {message}",
        started.elapsed().as_secs_f32()
    );
}
