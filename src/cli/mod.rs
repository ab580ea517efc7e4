use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "transcriptor",
    about = "Transcript client - Extract multi-language transcripts from video links",
    version,
    long_about = "A CLI client for a transcript extraction service. Handles account sessions with automatic token refresh, retries transient failures with backoff, and renders transcripts as text, paragraphs, SRT or WebVTT."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract the transcript of a video
    Extract {
        /// Video URL (YouTube watch, short or embed links)
        #[arg(value_name = "URL")]
        url: String,

        /// Language to display; prefix matches are accepted ("en" matches "en-US")
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,

        /// Ask the service for every available language (default unless --language is given)
        #[arg(long)]
        all_languages: bool,

        /// Output format (defaults to the configured format)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// List the languages returned by the service
        #[arg(long)]
        list_languages: bool,
    },

    /// Sign in and store the session
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "TRANSCRIPT_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account and sign in
    Register {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long, env = "TRANSCRIPT_PASSWORD", hide_env_values = true)]
        password: String,

        /// Full name shown on the account
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in account
    Whoami,

    /// Check that the service is reachable
    Health,

    /// Show or create the client configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// Text reflowed into paragraphs
    Paragraphs,
    /// SRT subtitle format
    Srt,
    /// WebVTT format
    Vtt,
    /// JSON with timestamps
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Paragraphs => write!(f, "paragraphs"),
            OutputFormat::Srt => write!(f, "srt"),
            OutputFormat::Vtt => write!(f, "vtt"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}
