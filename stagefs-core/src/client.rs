use std::sync::{Arc, PoisonError, RwLock};

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::model::{
    Item, ItemPage, Job, JobStatus, RemoteFault, ResponseDetails, UploadPart, UploadSession,
};

const USER_AGENT: &str = concat!("stagefs/", env!("CARGO_PKG_VERSION"));
const PART_NUMBER_HEADER: &str = "X-VaultAPI-FilePartNumber";
const ITEMS_PATH: &str = "services/file_staging/items";
const CONTENT_PATH: &str = "services/file_staging/items/content";
const UPLOAD_PATH: &str = "services/file_staging/upload";
const JOBS_PATH: &str = "services/jobs";

/// Error type reported by the server when the bearer token is no longer valid.
pub const SESSION_EXPIRED: &str = "INVALID_SESSION_ID";

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to connect: {0}")]
    Connection(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("[{kind}]: {message}")]
    Remote { kind: String, message: String },
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unknown error, response is empty")]
    EmptyResponse,
}

impl StagingError {
    pub fn is_session_expired(&self) -> bool {
        match self {
            StagingError::Remote { kind, .. } => kind == SESSION_EXPIRED,
            StagingError::Api { status, .. } => *status == StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }

    /// Remote error type, when the server produced one.
    pub fn remote_kind(&self) -> Option<&str> {
        match self {
            StagingError::Remote { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// Shared handle to the staging API. Clones share the HTTP pool and the
/// session token, so a re-login is visible to every clone.
#[derive(Clone)]
pub struct StagingClient {
    http: Client,
    base_url: Url,
    session: Arc<RwLock<Option<String>>>,
}

impl StagingClient {
    pub fn new(domain: &str, api_version: &str) -> Result<Self, StagingError> {
        Self::with_base_url(&format!("https://{domain}/api/{api_version}"))
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, StagingError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url,
            session: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn set_session(&self, token: impl Into<String>) {
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(token.into());
    }

    pub fn session(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn list_items(
        &self,
        path: &str,
        recursive: bool,
        limit: u32,
    ) -> Result<ItemPage, StagingError> {
        let mut url = self.item_endpoint(ITEMS_PATH, path)?;
        url.query_pairs_mut()
            .append_pair("recursive", bool_param(recursive))
            .append_pair("limit", &limit.to_string());
        self.fetch_page(url).await
    }

    /// Follows the continuation link of a previous page. The link is
    /// usually server-relative (`/api/v20.1/...`) but absolute links work too.
    pub async fn list_items_next(&self, next_page: &str) -> Result<ItemPage, StagingError> {
        let url = self.base_url.join(next_page)?;
        self.fetch_page(url).await
    }

    pub async fn export_items(&self, path: &str, recursive: bool) -> Result<Job, StagingError> {
        let mut url = self.item_endpoint(ITEMS_PATH, path)?;
        url.query_pairs_mut()
            .append_pair("recursive", bool_param(recursive))
            .append_pair("format_result", "csv");
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response::<Job>(response).await?.into_data()
    }

    pub async fn create_folder(&self, path: &str, overwrite: bool) -> Result<(), StagingError> {
        let form = Form::new()
            .text("path", path.to_string())
            .text("name", file_name(path).to_string())
            .text("kind", "folder")
            .text("overwrite", bool_param(overwrite));
        let url = self.endpoint(ITEMS_PATH)?;
        let response = self
            .authorized(self.http.post(url))
            .multipart(form)
            .send()
            .await?;
        Self::handle_response::<Item>(response).await?.into_unit()
    }

    pub async fn upload_file(
        &self,
        path: &str,
        overwrite: bool,
        bytes: Vec<u8>,
    ) -> Result<(), StagingError> {
        let name = file_name(path).to_string();
        let size = bytes.len();
        let form = Form::new()
            .text("path", path.to_string())
            .text("name", name.clone())
            .text("size", size.to_string())
            .text("kind", "file")
            .text("overwrite", bool_param(overwrite))
            .part("file", Part::bytes(bytes).file_name(name));
        let url = self.endpoint(ITEMS_PATH)?;
        let response = self
            .authorized(self.http.post(url))
            .multipart(form)
            .send()
            .await?;
        Self::handle_response::<Item>(response).await?.into_unit()
    }

    /// Starts a content download. The caller streams the body.
    pub async fn download_content(&self, path: &str) -> Result<Response, StagingError> {
        let url = self.item_endpoint(CONTENT_PATH, path)?;
        let response = self.authorized(self.http.get(url)).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Self::handle_response::<serde_json::Value>(response)
            .await?
            .into_unit()?;
        Err(StagingError::EmptyResponse)
    }

    pub async fn move_item(
        &self,
        path: &str,
        parent: &str,
        name: &str,
        overwrite: bool,
    ) -> Result<Job, StagingError> {
        let url = self.item_endpoint(ITEMS_PATH, path)?;
        let form = [
            ("parent", parent),
            ("name", name),
            ("overwrite", bool_param(overwrite)),
        ];
        let response = self
            .authorized(self.http.put(url))
            .form(&form)
            .send()
            .await?;
        Self::handle_response::<Job>(response).await?.into_data()
    }

    pub async fn delete_item(&self, path: &str, recursive: bool) -> Result<Job, StagingError> {
        let mut url = self.item_endpoint(ITEMS_PATH, path)?;
        url.query_pairs_mut()
            .append_pair("recursive", bool_param(recursive));
        let response = self.authorized(self.http.delete(url)).send().await?;
        Self::handle_response::<Job>(response).await?.into_data()
    }

    pub async fn list_upload_sessions(&self) -> Result<Vec<UploadSession>, StagingError> {
        let url = self.endpoint(UPLOAD_PATH)?;
        let response = self.authorized(self.http.get(url)).send().await?;
        let envelope = Self::handle_response::<Vec<UploadSession>>(response).await?;
        envelope.check()?;
        Ok(envelope.data.unwrap_or_default())
    }

    pub async fn begin_upload_session(
        &self,
        path: &str,
        size: u64,
        overwrite: bool,
    ) -> Result<UploadSession, StagingError> {
        let form = Form::new()
            .text("path", path.to_string())
            .text("name", file_name(path).to_string())
            .text("size", size.to_string())
            .text("overwrite", bool_param(overwrite));
        let url = self.endpoint(UPLOAD_PATH)?;
        let response = self
            .authorized(self.http.post(url))
            .multipart(form)
            .send()
            .await?;
        Self::handle_response::<UploadSession>(response)
            .await?
            .into_data()
    }

    pub async fn upload_part(
        &self,
        session_id: &str,
        part_number: u64,
        bytes: Vec<u8>,
    ) -> Result<UploadPart, StagingError> {
        let url = self.endpoint(&format!("{UPLOAD_PATH}/{session_id}"))?;
        let response = self
            .authorized(self.http.put(url))
            .header(PART_NUMBER_HEADER, part_number.to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        Self::handle_response::<UploadPart>(response)
            .await?
            .into_data()
    }

    pub async fn commit_upload_session(&self, session_id: &str) -> Result<Job, StagingError> {
        let url = self.endpoint(&format!("{UPLOAD_PATH}/{session_id}"))?;
        let response = self.authorized(self.http.post(url)).send().await?;
        Self::handle_response::<Job>(response).await?.into_data()
    }

    pub async fn delete_upload_session(&self, session_id: &str) -> Result<(), StagingError> {
        let url = self.endpoint(&format!("{UPLOAD_PATH}/{session_id}"))?;
        let response = self.authorized(self.http.delete(url)).send().await?;
        Self::handle_response::<serde_json::Value>(response)
            .await?
            .into_unit()
    }

    pub async fn job_status(&self, job_id: i64) -> Result<JobStatus, StagingError> {
        let url = self.endpoint(&format!("{JOBS_PATH}/{job_id}"))?;
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response::<JobStatus>(response)
            .await?
            .into_data()
    }

    async fn fetch_page(&self, url: Url) -> Result<ItemPage, StagingError> {
        let response = self.authorized(self.http.get(url)).send().await?;
        let envelope = Self::handle_response::<Vec<Item>>(response).await?;
        envelope.check()?;
        Ok(ItemPage {
            items: envelope.data.unwrap_or_default(),
            next_page: envelope
                .response_details
                .and_then(|details| details.next_page)
                .filter(|next| !next.is_empty()),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, StagingError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Appends `item_path` below `prefix` one encoded segment at a time, so
    /// names holding `#`, `?` or `%` stay part of the path.
    fn item_endpoint(&self, prefix: &str, item_path: &str) -> Result<Url, StagingError> {
        let mut url = self.endpoint(prefix)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments
                .pop_if_empty()
                .extend(item_path.split('/').filter(|segment| !segment.is_empty()));
            if item_path.ends_with('/') {
                segments.push("");
            }
        }
        Ok(url)
    }

    pub(crate) async fn handle_response<T: DeserializeOwned>(
        response: Response,
    ) -> Result<Envelope<T>, StagingError> {
        let status = response.status();
        tracing::debug!(%status, url = %response.url(), "staging api response");
        let body = response.bytes().await?;
        if body.is_empty() && status.is_success() {
            return Ok(Envelope::default());
        }
        match serde_json::from_slice::<Envelope<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(StagingError::Api {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
            Err(err) => Err(StagingError::Decode(err)),
        }
    }
}

/// Standard response wrapper. A non-empty `errors` list always wins over
/// the payload.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(rename = "responseStatus", default)]
    pub response_status: Option<String>,
    #[serde(rename = "responseDetails", default)]
    pub response_details: Option<ResponseDetails>,
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<RemoteFault>,
}

impl<T> Default for Envelope<T> {
    fn default() -> Self {
        Self {
            response_status: None,
            response_details: None,
            data: None,
            errors: Vec::new(),
        }
    }
}

impl<T> Envelope<T> {
    pub fn check(&self) -> Result<(), StagingError> {
        if let Some(fault) = self.errors.first() {
            return Err(StagingError::Remote {
                kind: fault.kind.clone(),
                message: fault.message.clone(),
            });
        }
        if self.response_status.as_deref() == Some("FAILURE") {
            return Err(StagingError::Remote {
                kind: "FAILURE".to_string(),
                message: "request failed without error details".to_string(),
            });
        }
        Ok(())
    }

    pub fn into_data(self) -> Result<T, StagingError> {
        self.check()?;
        self.data.ok_or(StagingError::EmptyResponse)
    }

    pub fn into_unit(self) -> Result<(), StagingError> {
        self.check()
    }
}

pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
