use std::io::SeekFrom;
use std::path::Path;
use std::time::Instant;

use stagefs_core::{Job, StagingClient, UploadSession};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::chunk::{ChunkPlan, MULTIPART_MIN_SIZE, file_size};
use crate::context::{CommandContext, log_time};
use crate::error::EngineError;

/// Multipart upload sessions. Progress lives on the server: a session is
/// found again by its remote path and resumed from the part count the
/// server confirmed.
pub struct UploadSessionStore<'a> {
    client: &'a StagingClient,
}

impl<'a> UploadSessionStore<'a> {
    pub fn new(client: &'a StagingClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<UploadSession>, EngineError> {
        Ok(self.client.list_upload_sessions().await?)
    }

    pub async fn resolve(&self, remote_path: &str) -> Result<Option<UploadSession>, EngineError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|session| session.path == remote_path))
    }

    pub async fn begin(
        &self,
        local_path: &Path,
        remote_path: &str,
        overwrite: bool,
    ) -> Result<UploadSession, EngineError> {
        let size = file_size(local_path)?;
        let started = Instant::now();
        let session = self
            .client
            .begin_upload_session(remote_path, size, overwrite)
            .await?;
        log_time(
            &format!("upload session created for file: {remote_path}"),
            started,
        );
        Ok(session)
    }

    /// Sends the parts the server has not confirmed yet, one at a time.
    /// Returns the number of parts sent.
    pub async fn upload_parts(
        &self,
        local_path: &Path,
        session: &UploadSession,
    ) -> Result<u64, EngineError> {
        // TODO: compare the local size with session.size before resuming;
        // a file changed since the session began is not detected.
        let size = file_size(local_path)?;
        let plan = ChunkPlan::resuming(size, session.uploaded_parts);
        let mut remaining = size.saturating_sub(session.uploaded_size);

        let path = session.path.as_str();
        let mut file = tokio::fs::File::open(local_path)
            .await
            .map_err(|err| EngineError::transfer(path, None, err))?;
        file.seek(SeekFrom::Start(session.uploaded_size))
            .await
            .map_err(|err| EngineError::transfer(path, Some(plan.start_part), err))?;

        let mut part_number = plan.start_part;
        let mut sent = 0;
        while remaining > 0 {
            let len = remaining.min(plan.part_size);
            let buffer = read_part(&mut file, len, path, part_number).await?;

            let part = self
                .client
                .upload_part(&session.id, part_number, buffer)
                .await
                .map_err(|err| EngineError::transfer(path, Some(part_number), err))?;
            remaining -= len;
            sent += 1;
            tracing::info!(
                "[{}] Uploaded part: {} of {}, size: {}, partContentMD5: {}",
                session.path,
                part.part_number,
                plan.total_parts,
                byte_count_si(part.size),
                part.part_content_md5.as_deref().unwrap_or("-"),
            );
            part_number += 1;
        }
        Ok(sent)
    }

    pub async fn commit(&self, session: &UploadSession) -> Result<Job, EngineError> {
        let started = Instant::now();
        let job = self.client.commit_upload_session(&session.id).await?;
        log_time(
            &format!(
                "upload session completed for file: {}, waiting for job completion",
                session.path
            ),
            started,
        );
        Ok(job)
    }

    pub async fn delete(&self, session: &UploadSession) -> Result<(), EngineError> {
        let started = Instant::now();
        self.client.delete_upload_session(&session.id).await?;
        log_time(
            &format!("Deleted upload session for {}", session.path),
            started,
        );
        Ok(())
    }
}

async fn read_part(
    file: &mut tokio::fs::File,
    len: u64,
    path: &str,
    part_number: u64,
) -> Result<Vec<u8>, EngineError> {
    let mut buffer = vec![0u8; len as usize];
    file.read_exact(&mut buffer)
        .await
        .map_err(|err| EngineError::transfer(path, Some(part_number), err))?;
    Ok(buffer)
}

/// Resolve-or-begin, send the missing parts, commit, and wait for the
/// commit job.
pub async fn multipart_upload(
    ctx: &CommandContext,
    local_path: &Path,
    remote_path: &str,
    overwrite: bool,
) -> Result<(), EngineError> {
    let size = file_size(local_path)?;
    if size < MULTIPART_MIN_SIZE {
        return Err(EngineError::invalid_input(format!(
            "{} file is less than {MULTIPART_MIN_SIZE} bytes",
            local_path.display()
        )));
    }

    let store = UploadSessionStore::new(ctx.client());
    let session = match store.resolve(remote_path).await? {
        Some(session) => {
            tracing::info!(
                "resuming upload session for {remote_path} after {} parts",
                session.uploaded_parts
            );
            session
        }
        None => store.begin(local_path, remote_path, overwrite).await?,
    };
    ctx.remember_upload_session(&session.id);

    store.upload_parts(local_path, &session).await?;
    let job = store.commit(&session).await?;
    ctx.poller()
        .wait(
            job.job_id,
            &format!("{} file upload successfully", session.path),
        )
        .await?;
    Ok(())
}

pub fn byte_count_si(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let unit = ['k', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {unit}B", bytes as f64 / div as f64)
}
