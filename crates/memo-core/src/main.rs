//! `memo` - command-line access to study memos.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use memo_core::{config, AppState};

/// Study memo command-line interface.
#[derive(Debug, Parser)]
#[command(name = "memo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Orthanc base URL.
    #[arg(long, env = "ORTHANC_URL")]
    orthanc_url: Option<String>,

    /// Local backup directory.
    #[arg(long, env = "MEMO_BACKUP_DIR")]
    backup_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Probe the Orthanc server.
    Status,
    /// Save a memo for a study.
    Save { study_uid: String, memo: String },
    /// Load the memo for a study.
    Load { study_uid: String },
    /// Delete the memo for a study from every tier.
    Delete { study_uid: String },
    /// Check whether a study has a memo.
    Has { study_uid: String },
    /// Read only the local backup.
    Local { study_uid: String },
    /// Embed a memo through the legacy attribute channel.
    Embed { study_uid: String, memo: String },
    /// Remove every memo from the local backup.
    Clear,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "memo=info,memo_core=info,memo_storage=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = config::init().clone();
    if let Some(url) = cli.orthanc_url {
        config.orthanc.base_url = url;
    }
    if let Some(dir) = cli.backup_dir {
        config.backup.dir = dir;
    }

    let state = AppState::from_config(&config)?;
    let memo = &state.memo;

    match cli.command {
        Commands::Status => {
            let connected = memo.check_connection().await;
            print(&json!({
                "orthancUrl": config.orthanc.base_url,
                "connected": connected,
                "status": memo.connection_status().await,
            }))?;
        }
        Commands::Save { study_uid, memo: text } => {
            print(&memo.save(&study_uid, &text).await)?;
        }
        Commands::Load { study_uid } => {
            print(&memo.load(&study_uid).await)?;
        }
        Commands::Delete { study_uid } => {
            memo.delete(&study_uid).await?;
            print(&json!({ "deleted": study_uid }))?;
        }
        Commands::Has { study_uid } => {
            let has_memo = memo.has_memo(&study_uid).await;
            print(&json!({ "studyInstanceUID": study_uid, "hasMemo": has_memo }))?;
        }
        Commands::Local { study_uid } => {
            let local = memo.load_local_only(&study_uid).await;
            print(&json!({ "studyInstanceUID": study_uid, "memo": local }))?;
        }
        Commands::Embed { study_uid, memo: text } => {
            let instance_id = memo.embed_legacy(&study_uid, &text).await?;
            print(&json!({ "studyInstanceUID": study_uid, "derivedInstanceId": instance_id }))?;
        }
        Commands::Clear => {
            memo.clear_all().await?;
            print(&json!({ "cleared": true }))?;
        }
    }

    Ok(())
}
