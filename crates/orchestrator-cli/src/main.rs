//! AI Orchestrator CLI - submit and monitor AI jobs from the terminal.
//!
//! Talks to the orchestrator backend through `orchestrator-core`: logs in,
//! keeps the session fresh, and lists or submits jobs.

mod commands;
mod format;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orchestrator_core::models::JobType;
use orchestrator_core::{auth, ApiClient, ApiError, Config, SessionStore};

#[derive(Parser)]
#[command(name = "orchestrator", version, about = "Submit and monitor AI Orchestrator jobs")]
struct Cli {
    /// Config file path (default: ~/.config/ai-orchestrator/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, e.g. http://127.0.0.1:8000/api
    #[arg(long, env = "ORCHESTRATOR_API_URL", global = true)]
    api_url: Option<String>,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Log in with a username or e-mail address
    Login {
        #[arg(short, long)]
        username: Option<String>,
        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// Log out and drop the stored session
    Logout {
        /// Also forget the remembered password
        #[arg(long)]
        forget: bool,
    },
    /// Show the signed-in user
    Whoami,
    /// Show session state and check it against the backend
    Status,
    /// Check that the backend is reachable
    Ping,
    /// List projects
    Projects,
    /// List jobs, newest first
    Jobs {
        /// Only show jobs with this status (pending, running, completed, failed, cancelled)
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one job in detail
    Job { id: i64 },
    /// List job results
    Results,
    /// Submit a new job
    Submit {
        #[arg(long)]
        project: i64,
        /// stt, tts, voice_cloning, dubbing, ai_stories, video_generation
        #[arg(long = "type", value_parser = parse_job_type)]
        job_type: JobType,
        #[arg(long)]
        input_url: Option<String>,
        /// Job parameter as key=value; repeatable
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
    },
    /// Cancel a pending or running job
    Cancel { id: i64 },
    /// Delete a job
    Delete { id: i64 },
    /// Job statistics and recent activity
    Dashboard,
}

fn parse_job_type(raw: &str) -> Result<JobType, String> {
    let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
    match JobType::from(normalized) {
        JobType::Other(_) => {
            let known: Vec<&str> = JobType::ALL.iter().map(|t| t.as_str()).collect();
            Err(format!(
                "unknown job type '{}' (expected one of: {})",
                raw,
                known.join(", ")
            ))
        }
        known => Ok(known),
    }
}

fn parse_meta(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG to control the level (e.g. RUST_LOG=orchestrator_core=debug).
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "orchestrator.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

/// Forget a session the backend no longer accepts.
fn drop_expired_session(session: &SessionStore) {
    if let Err(e) = session.clear_session() {
        warn!(error = %e, "Failed to clear expired session");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());
    info!("AI Orchestrator CLI starting");

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&config_path)?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
        config.normalize();
    }

    let api = ApiClient::new(&config, auth::storage_for(&config)?)?;
    let result = commands::run(cli.command, &api, &mut config, &config_path).await;

    if let Err(e) = result {
        match e.downcast_ref::<ApiError>() {
            Some(ApiError::SessionExpired) => {
                drop_expired_session(api.session());
                eprintln!("Your session has expired. Run `orchestrator login` to sign in again.");
            }
            Some(ApiError::Network(reason)) => {
                eprintln!(
                    "Cannot reach the backend at {} ({}). Check that it is running and try again.",
                    api.base_url(),
                    reason
                );
            }
            Some(api_error) => eprintln!("Error: {}", api_error),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::auth::{CredentialBundle, MemoryStorage, SessionStorage};

    /// Loads and saves in memory, but can never delete.
    struct StuckStorage(MemoryStorage);

    impl SessionStorage for StuckStorage {
        fn load(&self) -> anyhow::Result<Option<CredentialBundle>> {
            self.0.load()
        }

        fn save(&self, bundle: &CredentialBundle) -> anyhow::Result<()> {
            self.0.save(bundle)
        }

        fn clear(&self) -> anyhow::Result<()> {
            anyhow::bail!("session file is read-only")
        }
    }

    #[test]
    fn test_drop_expired_session_survives_storage_failure() {
        let store = SessionStore::new(
            &Config::default(),
            Box::new(StuckStorage(MemoryStorage::new())),
        )
        .unwrap();
        store.store_credentials("access-1", "refresh-1", None).unwrap();

        drop_expired_session(&store);
        assert!(!store.has_session());
    }

    #[test]
    fn test_parse_job_type() {
        assert_eq!(parse_job_type("tts"), Ok(JobType::TextToSpeech));
        assert_eq!(parse_job_type("Voice-Cloning"), Ok(JobType::VoiceCloning));
        assert!(parse_job_type("karaoke").unwrap_err().contains("ai_stories"));
    }

    #[test]
    fn test_parse_meta() {
        assert_eq!(
            parse_meta("target_language=es"),
            Ok(("target_language".to_string(), "es".to_string()))
        );
        assert_eq!(
            parse_meta("prompt=a=b"),
            Ok(("prompt".to_string(), "a=b".to_string()))
        );
        assert!(parse_meta("novalue").is_err());
        assert!(parse_meta("=x").is_err());
    }

    #[test]
    fn test_cli_parses_submit() {
        let cli = Cli::try_parse_from([
            "orchestrator",
            "submit",
            "--project",
            "3",
            "--type",
            "dubbing",
            "--meta",
            "source_language=en",
            "--meta",
            "target_language=es",
        ])
        .unwrap();
        match cli.command {
            Command::Submit {
                project,
                job_type,
                meta,
                ..
            } => {
                assert_eq!(project, 3);
                assert_eq!(job_type, JobType::Dubbing);
                assert_eq!(meta.len(), 2);
            }
            _ => panic!("expected submit"),
        }
    }
}
