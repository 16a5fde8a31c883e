use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteFault {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponseDetails {
    #[serde(default)]
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Item {
    pub path: String,
    #[serde(default)]
    pub name: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_date: Option<String>,
    #[serde(rename = "file_content_md5", default)]
    pub md5: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::File => "file",
            ItemKind::Folder => "folder",
        }
    }
}

/// One batch of a listing. `next_page` is the opaque continuation link;
/// `None` marks the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPage {
    pub items: Vec<Item>,
    pub next_page: Option<String>,
}

impl ItemPage {
    pub fn is_last(&self) -> bool {
        self.next_page.is_none()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadSession {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub name: String,
    pub size: u64,
    #[serde(rename = "uploaded", default)]
    pub uploaded_size: u64,
    #[serde(rename = "uploaded_parts", default)]
    pub uploaded_parts: u64,
    #[serde(rename = "created_date", default)]
    pub created_at: Option<String>,
    #[serde(rename = "expiration_date", default)]
    pub expires_at: Option<String>,
    #[serde(rename = "last_uploaded_date", default)]
    pub last_uploaded_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadPart {
    pub part_number: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub part_content_md5: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Job {
    pub job_id: i64,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct JobStatus {
    pub status: String,
    #[serde(default)]
    pub links: Vec<JobLink>,
}

impl JobStatus {
    pub const SUCCESS: &'static str = "SUCCESS";

    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS
    }

    pub fn link(&self, rel: &str) -> Option<&JobLink> {
        self.links.iter().find(|link| link.rel == rel)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct JobLink {
    pub rel: String,
    pub href: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub accept: Option<String>,
}
