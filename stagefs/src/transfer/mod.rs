//! File movement between the local disk and the staging area.

pub mod chunk;
pub mod pool;
pub mod session;
pub mod single;

use std::path::PathBuf;

use crate::context::CommandContext;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Upload,
    Download,
}

/// One unit of work handed to the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub kind: TransferKind,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub size: u64,
    pub md5: Option<String>,
}

impl TransferTask {
    pub fn upload(
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            kind: TransferKind::Upload,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            size,
            md5: None,
        }
    }

    pub fn download(
        remote_path: impl Into<String>,
        local_path: impl Into<PathBuf>,
        size: u64,
        md5: Option<String>,
    ) -> Self {
        Self {
            kind: TransferKind::Download,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            size,
            md5,
        }
    }

    pub async fn perform(&self, ctx: &CommandContext, overwrite: bool) -> Result<(), EngineError> {
        tracing::debug!(
            kind = ?self.kind,
            size = self.size,
            "transfer {} <-> {}",
            self.local_path.display(),
            self.remote_path
        );
        match self.kind {
            TransferKind::Upload => {
                single::upload_file(ctx, &self.local_path, &self.remote_path, overwrite).await
            }
            TransferKind::Download => {
                single::download_file(
                    ctx,
                    &self.remote_path,
                    &self.local_path,
                    self.md5.as_deref(),
                )
                .await
            }
        }
    }
}
