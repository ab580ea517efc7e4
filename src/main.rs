use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcript_client::cli::{Cli, Commands, OutputFormat};
use transcript_client::client::{ClientError, HealthStatus, RequestFailure, RetryEvent};
use transcript_client::config::Config;
use transcript_client::extract::{ExtractOptions, SubmissionOutcome};
use transcript_client::{output, utils, TranscriptClient};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose {
        "transcript_client=debug,transcriptor=debug"
    } else if cli.quiet {
        "transcript_client=error"
    } else {
        "transcript_client=info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().await?;

    match cli.command {
        Commands::Extract {
            url,
            language,
            all_languages,
            format,
            output,
            list_languages,
        } => {
            let client = TranscriptClient::from_config(&config)?;
            let format = match format {
                Some(format) => format,
                None => config
                    .app
                    .default_output_format
                    .parse::<OutputFormat>()
                    .map_err(|e| anyhow::anyhow!("Invalid app.default_output_format: {}", e))?,
            };
            let language = language.or_else(|| config.app.default_language.clone());

            let options = ExtractOptions {
                language: language.clone(),
                all_languages: all_languages || language.is_none(),
                ..ExtractOptions::default()
            };

            tracing::info!(%url, "Starting extraction");

            let progress = RetryProgress::start(
                client.orchestrator.subscribe(),
                cli.quiet,
                format!("Extracting transcript from {}", describe_source(&url)),
            );
            let outcome = client.extraction.submit(&url, &options).await;
            progress.finish().await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(failure) => return Err(report_failure(&failure)),
            };

            if outcome == SubmissionOutcome::Superseded {
                anyhow::bail!("Extraction was superseded by a newer request");
            }

            let variant = client
                .extraction
                .cache()
                .selected()
                .ok_or_else(|| anyhow::anyhow!("No transcript variant was returned"))?;

            if list_languages {
                eprintln!("Available languages:");
                for code in client.extraction.cache().available_languages() {
                    let marker = if code == variant.language_code { "*" } else { " " };
                    eprintln!("  {} {}", marker, code);
                }
            }

            if let Some(requested) = &language {
                if !variant.language_code.starts_with(requested.as_str()) {
                    eprintln!(
                        "{} '{}' not available, showing '{}'",
                        style("Note:").yellow(),
                        requested,
                        variant.language_code
                    );
                }
            }

            match output {
                Some(path) => {
                    let path = resolve_output_path(path, variant.result().title(), &format);
                    output::save_to_file(&variant, &path, &format).await?;
                    println!(
                        "Transcript ({}, {}) saved to: {}",
                        variant.language_code,
                        utils::format_duration(variant.duration()),
                        path.display()
                    );
                }
                None => {
                    output::print_to_console(&variant, &format)?;
                }
            }
        }
        Commands::Login { email, password } => {
            let client = TranscriptClient::from_config(&config)?;
            let session = client
                .auth
                .login(&email, &password)
                .await
                .map_err(|failure| report_failure(&failure))?;

            let who = session
                .user
                .map(|u| u.email)
                .filter(|e| !e.is_empty())
                .unwrap_or(email);
            println!("{} Logged in as {}", style("✓").green(), who);
        }
        Commands::Register {
            email,
            password,
            name,
        } => {
            let client = TranscriptClient::from_config(&config)?;
            client
                .auth
                .register(&email, &password, name.as_deref())
                .await
                .map_err(|failure| report_failure(&failure))?;

            println!("{} Account created for {}", style("✓").green(), email);
        }
        Commands::Logout => {
            let client = TranscriptClient::from_config(&config)?;
            client.auth.logout()?;
            println!("Logged out");
        }
        Commands::Whoami => {
            let client = TranscriptClient::from_config(&config)?;
            let profile = client
                .auth
                .me()
                .await
                .map_err(|failure| report_failure(&failure))?;

            println!("Email: {}", profile.email);
            if let Some(name) = profile.full_name {
                println!("Name: {}", name);
            }
        }
        Commands::Health => {
            let client = TranscriptClient::from_config(&config)?;
            match client.extraction.health().await {
                HealthStatus::Healthy { latency_ms } => {
                    println!(
                        "{} {} is healthy ({} ms)",
                        style("✓").green(),
                        config.api.base_url(),
                        latency_ms
                    );
                }
                HealthStatus::Unhealthy { status, message } => {
                    anyhow::bail!("Service responded with {}: {}", status, message);
                }
                HealthStatus::Unreachable(reason) => {
                    anyhow::bail!("Service unreachable: {}", reason);
                }
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Configuration file: {}", Config::config_path()?.display());
                println!("Edit it to change the API environment, key and retry settings.");
            }
        }
    }

    Ok(())
}

/// Spinner that reports retries as progress instead of errors
struct RetryProgress {
    bar: Option<ProgressBar>,
    listener: tokio::task::JoinHandle<()>,
}

impl RetryProgress {
    fn start(mut events: broadcast::Receiver<RetryEvent>, quiet: bool, message: String) -> Self {
        let bar = if quiet {
            None
        } else {
            let bar = ProgressBar::new_spinner();
            if let Ok(spinner) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                bar.set_style(spinner);
            }
            bar.set_message(message);
            bar.enable_steady_tick(Duration::from_millis(100));
            Some(bar)
        };

        let listener_bar = bar.clone();
        let listener = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let line = format!(
                            "{} - retrying in {}s ({}/{})",
                            event.last_error_message,
                            event.delay_ms / 1000,
                            event.attempt_index,
                            event.max_attempts
                        );
                        match &listener_bar {
                            Some(bar) => bar.set_message(line),
                            None => tracing::info!("{}", line),
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Self { bar, listener }
    }

    async fn finish(self) {
        self.listener.abort();
        let _ = self.listener.await;
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Turn a terminal failure into a user-facing error
fn report_failure(failure: &RequestFailure) -> anyhow::Error {
    if failure.error == ClientError::EmptyResult {
        return anyhow::anyhow!(
            "{} after {} submission(s); the video may have no captions",
            failure.error,
            failure.attempts
        );
    }

    if failure.retries_exhausted {
        return anyhow::anyhow!(
            "{} (gave up after {} attempts, the service may be busy; try again later)",
            failure.error,
            failure.attempts
        );
    }

    if failure.error.requires_login() {
        return anyhow::anyhow!(
            "{}\n  Run `transcriptor login --email <EMAIL>` to sign in.",
            failure.error
        );
    }

    anyhow::anyhow!("{}", failure.error)
}

fn describe_source(url: &str) -> String {
    utils::extract_domain(url).unwrap_or_else(|| url.to_string())
}

/// Directories receive a file named after the video title
fn resolve_output_path(path: PathBuf, title: Option<&str>, format: &OutputFormat) -> PathBuf {
    if !path.is_dir() {
        return path;
    }

    let stem = title
        .map(utils::sanitize_filename)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "transcript".to_string());
    path.join(format!("{}.{}", stem, output::extension_for(format)))
}
