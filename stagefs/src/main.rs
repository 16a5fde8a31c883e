use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dialoguer::Password;
use stagefs::commands::{
    self, DownloadArgs, ListArgs, MkdirArgs, MoveArgs, RemoveArgs, UploadArgs,
};
use stagefs::config::ConfigStore;
use stagefs::context::CommandContext;
use stagefs::storage::password_from_env;
use stagefs_core::StagingClient;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "stagefs", version, about = "Manage files in the File Staging area")]
struct Cli {
    /// Verbose request logging
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Log in and remember the session
    Login(LoginArgs),
    /// Drop the cached session
    Logout {
        /// Also clear all configuration data
        #[arg(short, long)]
        clear: bool,
    },
    /// List remote files and folders
    Ls(ListArgs),
    /// Create a remote folder
    Mkdir(MkdirArgs),
    /// Upload a local file or folder
    Upload(UploadArgs),
    /// Download a remote file or folder
    Download(DownloadArgs),
    /// Move or rename a remote file or folder
    Mv(MoveArgs),
    /// Delete a remote file or folder
    Rm(RemoveArgs),
    /// List multipart upload sessions
    Mls,
    /// Delete the multipart upload session of a remote file
    Mrm { remote: String },
    /// Show jobs that have not been seen completing
    Jobs,
}

#[derive(Debug, Clone, Args, PartialEq, Eq)]
struct LoginArgs {
    #[arg(short, long = "domain_name", env = "STAGEFS_DOMAIN")]
    domain: Option<String>,
    #[arg(short, long, env = "STAGEFS_USERNAME")]
    username: Option<String>,
    #[arg(short = 'a', long = "api_version")]
    api_version: Option<String>,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Login(_) => "login",
            Command::Logout { .. } => "logout",
            Command::Ls(_) => "ls",
            Command::Mkdir(_) => "mkdir",
            Command::Upload(_) => "upload",
            Command::Download(_) => "download",
            Command::Mv(_) => "mv",
            Command::Rm(_) => "rm",
            Command::Mls => "mls",
            Command::Mrm { .. } => "mrm",
            Command::Jobs => "jobs",
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let name = cli.command.name();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{name} - {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let mut config = ConfigStore::open_default()?;
    match command {
        Command::Login(args) => login(config, args).await,
        Command::Logout { clear } => commands::logout(&mut config, clear),
        Command::Jobs => {
            commands::list_jobs(&config);
            Ok(())
        }
        remote => {
            let ctx = Arc::new(open_context(config)?);
            match remote {
                Command::Ls(args) => commands::list(&ctx, &args).await,
                Command::Mkdir(args) => commands::mkdir(&ctx, &args).await,
                Command::Upload(args) => commands::upload(ctx, &args).await,
                Command::Download(args) => commands::download(ctx, &args).await,
                Command::Mv(args) => commands::move_item(&ctx, &args).await,
                Command::Rm(args) => commands::remove(&ctx, &args).await,
                Command::Mls => commands::list_sessions(&ctx).await,
                Command::Mrm { remote } => commands::remove_session(&ctx, &remote).await,
                Command::Login(_) | Command::Logout { .. } | Command::Jobs => Ok(()),
            }
        }
    }
}

/// Builds the client from the saved domain and restores the last session.
fn open_context(config: ConfigStore) -> anyhow::Result<CommandContext> {
    let domain = config.require_domain_name()?;
    let client = StagingClient::new(&domain, &config.api_version())?;
    if let Some(auth) = &config.settings().auth_result {
        client.set_session(auth.session_id.clone());
    }
    Ok(CommandContext::new(client, config))
}

async fn login(mut config: ConfigStore, args: LoginArgs) -> anyhow::Result<()> {
    let settings = config.settings_mut();
    if let Some(domain) = args.domain {
        settings.domain_name = Some(domain);
    }
    if let Some(api_version) = args.api_version {
        settings.api_version = Some(api_version);
    }
    if let Some(username) = args.username {
        settings.username = Some(username);
    }
    let Some(username) = config.username() else {
        anyhow::bail!("username is required, pass -u <username>");
    };
    config.save()?;

    let password = match password_from_env() {
        Some(password) => password,
        None => {
            tokio::task::spawn_blocking(|| Password::new().with_prompt("Enter Password").interact())
                .await??
        }
    };

    let ctx = open_context(config)?;
    commands::login(&ctx, &username, password.trim()).await
}
