pub mod application;
pub mod domain;
pub mod infrastructure;

use anyhow::{Context, anyhow};
use application::commands::{
    AppState, ConfigureRequest, ConfigureResponse, configure_impl, list_impl, refresh_impl,
    status_impl, watch_impl,
};
use application::status::STATUS_LOOKAHEAD_DAYS;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use domain::presentation::WidgetRow;
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "moodle-deadlines", version, about = "Watches Moodle for assignments that are due soon")]
pub struct Cli {
    /// Workspace holding config/, state/ and logs/. Defaults to the platform data directory.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Save credentials and schedule, then refresh once.
    Configure {
        #[arg(long)]
        username: Option<String>,
        #[arg(long, conflicts_with = "password_stdin")]
        password: Option<String>,
        /// Read the password from the first line of stdin.
        #[arg(long)]
        password_stdin: bool,
        #[arg(long = "refresh-hours")]
        refresh_interval_hours: Option<u32>,
        #[arg(long = "lead-hours")]
        notification_lead_hours: Option<u32>,
        /// IANA zone name for displayed due times; an empty value means the system zone.
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Run one refresh: fetch, notify and publish widget rows.
    Refresh,
    /// Log in and show assignments due in the next few days.
    Status {
        #[arg(long, default_value_t = STATUS_LOOKAHEAD_DAYS)]
        days: u32,
    },
    /// Print the rows of the last published widget snapshot.
    List,
    /// Refresh periodically until interrupted.
    Watch,
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn default_workspace_root() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from("dev", "moodle-deadlines", "moodle-deadlines")
        .ok_or_else(|| anyhow!("could not determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

async fn configure(state: &AppState, request: ConfigureRequest) -> Result<ConfigureResponse, String> {
    configure_impl(state, request)
        .await
        .map_err(|error| state.command_error("configure", &error))
}

async fn refresh(state: &AppState) -> Result<String, String> {
    refresh_impl(state)
        .await
        .map_err(|error| state.command_error("refresh", &error))
}

async fn status(state: &AppState, days: u32) -> Result<String, String> {
    status_impl(state, days)
        .await
        .map_err(|error| state.command_error("status", &error))
}

fn list(state: &AppState) -> Result<Vec<WidgetRow>, String> {
    list_impl(state).map_err(|error| state.command_error("list", &error))
}

async fn watch_until_interrupted(state: &AppState) -> Result<usize, String> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(error) => {
                tracing::warn!(%error, "ctrl-c handler unavailable; stop the process to exit");
                std::future::pending::<()>().await;
            }
        }
    });
    watch_impl(state, shutdown_rx)
        .await
        .map_err(|error| state.command_error("watch", &error))
}

fn read_password_line() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let workspace_root = match cli.data_dir {
        Some(path) => path,
        None => default_workspace_root()?,
    };
    let state = AppState::open(workspace_root.clone())
        .with_context(|| format!("failed to open workspace {}", workspace_root.display()))?;
    tracing::debug!(workspace = %workspace_root.display(), "workspace ready");

    match cli.command {
        Command::Configure {
            username,
            password,
            password_stdin,
            refresh_interval_hours,
            notification_lead_hours,
            timezone,
        } => {
            let password = if password_stdin {
                Some(read_password_line()?)
            } else {
                password
            };
            let response = configure(
                &state,
                ConfigureRequest {
                    username,
                    password,
                    refresh_interval_hours,
                    notification_lead_hours,
                    timezone,
                },
            )
            .await
            .map_err(|message| anyhow!(message))?;
            println!(
                "Saved settings for {} (refresh every {}h, notify {}h ahead).",
                response.username, response.refresh_interval_hours, response.notification_lead_hours
            );
            println!("Refresh {}", response.refresh);
        }
        Command::Refresh => {
            let message = refresh(&state).await.map_err(|message| anyhow!(message))?;
            println!("{message}");
        }
        Command::Status { days } => {
            let view = status(&state, days).await.map_err(|message| anyhow!(message))?;
            println!("{view}");
        }
        Command::List => {
            let rows = list(&state).map_err(|message| anyhow!(message))?;
            if rows.is_empty() {
                println!("No assignments published yet. Run `refresh` first.");
            }
            for row in rows {
                println!("■ {}\n  {}\n  {}\n  {}\n", row.title, row.course, row.due_label, row.url);
            }
        }
        Command::Watch => {
            let runs = watch_until_interrupted(&state)
                .await
                .map_err(|message| anyhow!(message))?;
            println!("Stopped after {runs} refreshes.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_configure_flags() {
        let cli = Cli::try_parse_from([
            "moodle-deadlines",
            "--data-dir",
            "/tmp/md",
            "configure",
            "--username",
            "alice",
            "--refresh-hours",
            "3",
            "--lead-hours",
            "24",
        ])
        .expect("parse");

        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/md")));
        match cli.command {
            Command::Configure {
                username,
                refresh_interval_hours,
                notification_lead_hours,
                password_stdin,
                ..
            } => {
                assert_eq!(username.as_deref(), Some("alice"));
                assert_eq!(refresh_interval_hours, Some(3));
                assert_eq!(notification_lead_hours, Some(24));
                assert!(!password_stdin);
            }
            other => panic!("expected configure, got {other:?}"),
        }
    }

    #[test]
    fn status_defaults_to_seven_days() {
        let cli = Cli::try_parse_from(["moodle-deadlines", "status"]).expect("parse");
        assert!(matches!(cli.command, Command::Status { days: 7 }));
    }

    #[test]
    fn password_flags_conflict() {
        assert!(Cli::try_parse_from([
            "moodle-deadlines",
            "configure",
            "--password",
            "x",
            "--password-stdin",
        ])
        .is_err());
    }
}
