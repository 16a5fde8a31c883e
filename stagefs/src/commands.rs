use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use clap::Args;
use dialoguer::Confirm;
use stagefs_core::{Item, ItemKind, ItemPage};
use walkdir::WalkDir;

use crate::config::ConfigStore;
use crate::context::{CommandContext, log_time};
use crate::error::EngineError;
use crate::guard::with_session_retry;
use crate::paging::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, PagingCursor};
use crate::storage::CredentialStore;
use crate::transfer::pool::{BatchReport, for_each_concurrent};
use crate::transfer::session::{UploadSessionStore, byte_count_si};
use crate::transfer::{TransferTask, single};

const LISTING_RULE: &str =
    "====================================================================";
const SESSIONS_RULE: &str =
    "==============================================================================================";

#[derive(Debug, Clone, Args, PartialEq, Eq)]
pub struct ListArgs {
    /// Remote file or folder
    #[arg(default_value = "/")]
    pub path: String,
    /// List all sub directories
    #[arg(short, long)]
    pub recursive: bool,
    /// Items per page (0-1000)
    #[arg(short, long, default_value_t = DEFAULT_PAGE_LIMIT)]
    pub limit: u32,
    /// Print every page without asking
    #[arg(long)]
    pub all: bool,
    /// Ask the server for a CSV export instead of printing
    #[arg(long)]
    pub export: bool,
}

#[derive(Debug, Clone, Args, PartialEq, Eq)]
pub struct MkdirArgs {
    pub path: String,
    #[arg(short, long)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Args, PartialEq, Eq)]
pub struct UploadArgs {
    pub local: PathBuf,
    pub remote: String,
    #[arg(short, long)]
    pub overwrite: bool,
    /// Number of concurrent uploads
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    pub threads: usize,
}

#[derive(Debug, Clone, Args, PartialEq, Eq)]
pub struct DownloadArgs {
    pub remote: String,
    pub local: PathBuf,
    #[arg(short, long)]
    pub recursive: bool,
    /// Number of concurrent downloads
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    pub threads: usize,
}

#[derive(Debug, Clone, Args, PartialEq, Eq)]
pub struct MoveArgs {
    pub source: String,
    pub destination: String,
    /// Overwrite a file or merge existing folders
    #[arg(short, long)]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Args, PartialEq, Eq)]
pub struct RemoveArgs {
    pub path: String,
    #[arg(short, long)]
    pub recursive: bool,
}

async fn guarded<T, Op, Fut>(ctx: &CommandContext, op: Op) -> anyhow::Result<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    with_session_retry(op, || ctx.relogin()).await
}

pub async fn login(ctx: &CommandContext, username: &str, password: &str) -> anyhow::Result<()> {
    ctx.login(username, password).await?;
    match CredentialStore::new(username).and_then(|store| store.save_password(password)) {
        Ok(()) => {}
        Err(err) => tracing::warn!("password not saved, automatic re-login is disabled: {err}"),
    }
    Ok(())
}

pub fn logout(config: &mut ConfigStore, clear: bool) -> anyhow::Result<()> {
    if clear {
        println!("Clearing configuration..");
        if let Some(username) = config.username() {
            CredentialStore::new(&username)?.delete_password()?;
        }
        config.reset()?;
        return Ok(());
    }
    config.settings_mut().auth_result = None;
    config.save()?;
    tracing::info!("logout successful.");
    Ok(())
}

pub fn list_jobs(config: &ConfigStore) {
    let jobs = &config.settings().active_jobs;
    if jobs.is_empty() {
        println!("no active jobs");
        return;
    }
    println!("{:<12}  message", "job id");
    for (job_id, message) in jobs {
        println!("{job_id:<12}  {message}");
    }
}

pub async fn list(ctx: &CommandContext, args: &ListArgs) -> anyhow::Result<()> {
    if args.limit > MAX_PAGE_LIMIT {
        return Err(EngineError::invalid_input(format!(
            "limit must be between 0 and {MAX_PAGE_LIMIT}"
        ))
        .into());
    }
    if args.export {
        return guarded(ctx, || export(ctx, args)).await;
    }
    guarded(ctx, || list_pages(ctx, args)).await
}

async fn list_pages(ctx: &CommandContext, args: &ListArgs) -> anyhow::Result<()> {
    let mut cursor = PagingCursor::new(ctx.client(), &args.path, args.recursive, args.limit);
    while let Some(page) = cursor.next_page().await? {
        print_page(&args.path, &page);
        if page.is_last() {
            break;
        }
        if !args.all && !confirm_next_page().await? {
            break;
        }
    }
    Ok(())
}

async fn export(ctx: &CommandContext, args: &ListArgs) -> anyhow::Result<()> {
    let started = Instant::now();
    let job = ctx
        .client()
        .export_items(&args.path, args.recursive)
        .await?;
    log_time("export submitted successfully, waiting for job completion", started);
    let message = format!("{} listing exported successfully", args.path);
    match ctx.poller().wait(job.job_id, &message).await? {
        Some(link) => println!("results: {}", link.href),
        None => println!("job {} finished without a results link", job.job_id),
    }
    Ok(())
}

fn print_page(path: &str, page: &ItemPage) {
    println!("listing: {path}");
    println!("{:<6.6}  {:<50.50}  size", "kind", "path");
    println!("{LISTING_RULE}");
    for item in &page.items {
        println!(
            "{:<6.6}  {:<50.50}  {}",
            item.kind.as_str(),
            fit_width(&item.path, 50),
            byte_count_si(item.size)
        );
    }
}

/// Keeps the tail of `value`, which is the informative end of a path.
fn fit_width(value: &str, width: usize) -> String {
    let len = value.chars().count();
    if len <= width {
        return value.to_string();
    }
    let tail: String = value.chars().skip(len - (width - 3)).collect();
    format!("...{tail}")
}

async fn confirm_next_page() -> anyhow::Result<bool> {
    let answer = tokio::task::spawn_blocking(|| {
        Confirm::new()
            .with_prompt("Continue to next page?")
            .default(true)
            .interact()
    })
    .await??;
    Ok(answer)
}

pub async fn mkdir(ctx: &CommandContext, args: &MkdirArgs) -> anyhow::Result<()> {
    guarded(ctx, || async {
        ctx.ensure_folder(&args.path, args.overwrite, true).await?;
        Ok::<_, anyhow::Error>(())
    })
    .await
}

pub async fn upload(ctx: Arc<CommandContext>, args: &UploadArgs) -> anyhow::Result<()> {
    let metadata = std::fs::metadata(&args.local).map_err(|err| {
        EngineError::invalid_input(format!("{} not found: {err}", args.local.display()))
    })?;

    if metadata.is_file() {
        let remote = remote_file_path(&args.remote, &args.local);
        return guarded(&ctx, || async {
            single::upload_file(&ctx, &args.local, &remote, args.overwrite).await?;
            Ok::<_, anyhow::Error>(())
        })
        .await;
    }

    let report = guarded(&ctx, || upload_tree(Arc::clone(&ctx), args)).await?;
    finish_batch("upload", report)
}

/// A remote path ending in `/` names a folder that receives the local file.
fn remote_file_path(remote: &str, local: &Path) -> String {
    match (remote.ends_with('/'), local.file_name()) {
        (true, Some(name)) => format!("{remote}{}", name.to_string_lossy()),
        _ => remote.to_string(),
    }
}

async fn upload_tree(ctx: Arc<CommandContext>, args: &UploadArgs) -> anyhow::Result<BatchReport> {
    let remote_root = args.remote.trim_end_matches('/');
    let mut tasks = Vec::new();
    for entry in WalkDir::new(&args.local).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", args.local.display()))?;
        let relative = entry
            .path()
            .strip_prefix(&args.local)
            .with_context(|| format!("{} is outside the upload root", entry.path().display()))?;
        let remote = join_remote(remote_root, relative);

        if entry.file_type().is_dir() {
            ctx.ensure_folder(&remote, true, false).await?;
        } else if entry.file_type().is_file() {
            let size = entry
                .metadata()
                .with_context(|| format!("reading {}", entry.path().display()))?
                .len();
            tasks.push(TransferTask::upload(entry.path(), remote, size));
        }
    }

    let overwrite = args.overwrite;
    Ok(run_tasks(ctx, tasks, args.threads, overwrite).await)
}

fn join_remote(root: &str, relative: &Path) -> String {
    let mut remote = root.to_string();
    for component in relative.components() {
        remote.push('/');
        remote.push_str(&component.as_os_str().to_string_lossy());
    }
    if remote.is_empty() {
        remote.push('/');
    }
    remote
}

pub async fn download(ctx: Arc<CommandContext>, args: &DownloadArgs) -> anyhow::Result<()> {
    let report = guarded(&ctx, || download_pages(Arc::clone(&ctx), args)).await?;
    finish_batch("download", report)
}

async fn download_pages(
    ctx: Arc<CommandContext>,
    args: &DownloadArgs,
) -> anyhow::Result<BatchReport> {
    let mut total = BatchReport::default();
    let mut cursor = PagingCursor::new(ctx.client(), &args.remote, args.recursive, DEFAULT_PAGE_LIMIT);
    while let Some(page) = cursor.next_page().await? {
        let tasks: Vec<_> = page
            .items
            .iter()
            .filter(|item| item.kind == ItemKind::File)
            .map(|item| download_task(item, &args.remote, &args.local))
            .collect();
        let report = run_tasks(Arc::clone(&ctx), tasks, args.threads, false).await;
        total.completed += report.completed;
        total.failed += report.failed;
    }
    Ok(total)
}

fn download_task(item: &Item, remote_root: &str, local_root: &Path) -> TransferTask {
    let relative = item
        .path
        .strip_prefix(remote_root)
        .unwrap_or(&item.path)
        .trim_start_matches('/');
    let target = if relative.is_empty() {
        if local_root.is_dir() {
            local_root.join(&item.name)
        } else {
            local_root.to_path_buf()
        }
    } else {
        local_root.join(relative)
    };
    TransferTask::download(item.path.clone(), target, item.size, item.md5.clone())
}

/// Each task retries once after an expired session. The re-login itself is
/// shared by the whole command through the context.
async fn run_tasks(
    ctx: Arc<CommandContext>,
    tasks: Vec<TransferTask>,
    threads: usize,
    overwrite: bool,
) -> BatchReport {
    for_each_concurrent(tasks, threads, move |task: TransferTask| {
        let ctx = Arc::clone(&ctx);
        async move {
            with_session_retry(
                || task.perform(&ctx, overwrite),
                || ctx.relogin(),
            )
            .await
            .map_err(|err| format!("{} - {err}", task.remote_path))
        }
    })
    .await
}

fn finish_batch(operation: &str, report: BatchReport) -> anyhow::Result<()> {
    tracing::info!(
        "{operation} finished: {} succeeded, {} failed",
        report.completed,
        report.failed
    );
    if report.failed > 0 {
        anyhow::bail!("{} of {} transfers failed", report.failed, report.total());
    }
    Ok(())
}

pub async fn move_item(ctx: &CommandContext, args: &MoveArgs) -> anyhow::Result<()> {
    let (parent, name) = move_target(&args.source, &args.destination);
    guarded(ctx, || async {
        let started = Instant::now();
        let job = ctx
            .client()
            .move_item(&args.source, &parent, &name, args.overwrite)
            .await?;
        log_time("mv submitted successfully, waiting for job completion", started);
        let message = format!("{} moved to {} successfully", args.source, args.destination);
        ctx.poller().wait(job.job_id, &message).await?;
        Ok::<_, anyhow::Error>(())
    })
    .await
}

/// Destination parent and name; a destination ending in `/` keeps the
/// source name.
fn move_target(source: &str, destination: &str) -> (String, String) {
    if destination.len() > 1 && destination.ends_with('/') {
        let (_, name) = split_parent_and_name(source);
        return (destination.trim_end_matches('/').to_string(), name);
    }
    split_parent_and_name(destination)
}

fn split_parent_and_name(path: &str) -> (String, String) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", name)) => ("/".to_string(), name.to_string()),
        Some((parent, name)) => (parent.to_string(), name.to_string()),
        None => ("/".to_string(), trimmed.to_string()),
    }
}

pub async fn remove(ctx: &CommandContext, args: &RemoveArgs) -> anyhow::Result<()> {
    guarded(ctx, || async {
        let started = Instant::now();
        let job = ctx
            .client()
            .delete_item(&args.path, args.recursive)
            .await?;
        log_time("rm submitted successfully, waiting for job completion", started);
        ctx.poller()
            .wait(job.job_id, &format!("{} removed successfully", args.path))
            .await?;
        Ok::<_, anyhow::Error>(())
    })
    .await
}

pub async fn list_sessions(ctx: &CommandContext) -> anyhow::Result<()> {
    let sessions = guarded(ctx, || async {
        Ok::<_, anyhow::Error>(UploadSessionStore::new(ctx.client()).list().await?)
    })
    .await?;

    println!("listing upload sessions: ");
    println!(
        "{:<30.30}  {:<16.16} {:<16.16} {:<10.10} {:<16.16}",
        "path", "size", "up size", "up parts", "expiration"
    );
    println!("{SESSIONS_RULE}");
    for session in sessions {
        println!(
            "{:<30.30}  {:<16.16} {:<16.16} {:<10} {:<16.16}",
            fit_width(&session.path, 30),
            byte_count_si(session.size),
            byte_count_si(session.uploaded_size),
            session.uploaded_parts,
            session.expires_at.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

pub async fn remove_session(ctx: &CommandContext, remote: &str) -> anyhow::Result<()> {
    guarded(ctx, || async {
        let store = UploadSessionStore::new(ctx.client());
        let session = store.resolve(remote).await?.ok_or_else(|| {
            EngineError::invalid_input(format!("no upload session found for {remote}"))
        })?;
        store.delete(&session).await?;
        Ok::<_, anyhow::Error>(())
    })
    .await
}
