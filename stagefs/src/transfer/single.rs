use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use futures_util::StreamExt;
use md5::Context;
use stagefs_core::StagingError;
use tokio::io::AsyncWriteExt;

use super::chunk::{MULTIPART_THRESHOLD, file_size};
use super::session::multipart_upload;
use crate::context::{CommandContext, log_time};
use crate::error::EngineError;

/// Uploads one file, switching to a multipart session for large files.
pub async fn upload_file(
    ctx: &CommandContext,
    local_path: &Path,
    remote_path: &str,
    overwrite: bool,
) -> Result<(), EngineError> {
    let size = file_size(local_path)?;
    if size >= MULTIPART_THRESHOLD {
        return multipart_upload(ctx, local_path, remote_path, overwrite).await;
    }

    let bytes = tokio::fs::read(local_path)
        .await
        .map_err(|err| EngineError::transfer(remote_path, None, err))?;
    let started = Instant::now();
    ctx.client()
        .upload_file(remote_path, overwrite, bytes)
        .await?;
    log_time(&format!("uploaded file: {remote_path}"), started);
    Ok(())
}

/// Streams a remote file into `target` through a `.partial` sibling that is
/// renamed once complete. With `expected_md5` the content is checked first.
pub async fn download_file(
    ctx: &CommandContext,
    remote_path: &str,
    target: &Path,
    expected_md5: Option<&str>,
) -> Result<(), EngineError> {
    tracing::debug!("Download file: {remote_path} -> {}", target.display());
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        match tokio::fs::metadata(parent).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(EngineError::invalid_input(format!(
                    "cannot create directory, a file with the same name exists: {}",
                    parent.display()
                )));
            }
            Ok(_) => {}
            Err(_) => tokio::fs::create_dir_all(parent).await?,
        }
    }

    let response = ctx.client().download_content(remote_path).await?;
    let partial = partial_path(target);
    let failed = |err: io::Error| EngineError::transfer(remote_path, None, err);
    let mut file = tokio::fs::File::create(&partial).await.map_err(failed)?;
    let mut stream = response.bytes_stream();
    let mut md5 = expected_md5.map(|_| Context::new());

    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|err| EngineError::transfer(remote_path, None, StagingError::from(err)))?;
        file.write_all(&chunk).await.map_err(failed)?;
        if let Some(ctx) = md5.as_mut() {
            ctx.consume(&chunk);
        }
    }

    file.flush().await.map_err(failed)?;
    file.sync_all().await.map_err(failed)?;
    drop(file);

    if let (Some(expected), Some(ctx)) = (expected_md5, md5) {
        let actual_md5 = format!("{:x}", ctx.compute());
        if actual_md5 != expected.to_ascii_lowercase() {
            if let Err(err) = tokio::fs::remove_file(&partial).await {
                tracing::warn!("failed to remove {}: {err}", partial.display());
            }
            return Err(EngineError::IntegrityMismatch {
                path: remote_path.to_string(),
                expected_md5: expected.to_ascii_lowercase(),
                actual_md5,
            });
        }
    }

    tokio::fs::rename(&partial, target).await.map_err(failed)?;
    Ok(())
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
