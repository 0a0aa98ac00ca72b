use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};
use progress_core::completion::DEFAULT_COMPLETION_THRESHOLD;

#[derive(Debug, Parser)]
#[command(author, version, about = "Course progress tracking server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Create a demo course and enroll a user in it.
    Seed {
        /// User to enroll in the demo course
        #[arg(long, default_value_t = 1)]
        user_id: u64,
    },
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// `SQLite` database URL or path
    #[arg(long = "db", env = "LMS_DB_URL", default_value = "sqlite://lms.sqlite3", global = true)]
    pub db_url: String,

    /// Address the HTTP server binds to
    #[arg(long, env = "LMS_BIND", default_value = "0.0.0.0:8080", global = true)]
    pub bind: SocketAddr,

    /// Playback percentage at which a video section completes
    #[arg(
        long,
        env = "LMS_COMPLETION_THRESHOLD",
        default_value_t = DEFAULT_COMPLETION_THRESHOLD,
        global = true
    )]
    pub completion_threshold: f64,
}

impl Settings {
    #[must_use]
    pub fn database_url(&self) -> String {
        normalize_sqlite_url(&self.db_url)
    }
}

/// Turn a bare or relative path into an absolute `sqlite://` URL that creates
/// the file on first use.
#[must_use]
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.contains("mode=memory") {
        return trimmed.to_string();
    }

    let (path_str, query) = match trimmed.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (trimmed, None),
    };
    let path_str = path_str
        .strip_prefix("sqlite://")
        .or_else(|| path_str.strip_prefix("sqlite:"))
        .unwrap_or(path_str);

    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!(
        "sqlite://{}?{}",
        absolute.display(),
        query.unwrap_or("mode=rwc")
    )
}
