//! `contactd` - contact form backend
//!
//! Runs the HTTP server and provides admin commands for stored submissions,
//! email delivery and configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use portfolio_contact::cli::{
    Cli, Command, ConfigCommand, EmailCommand, ServeCommand, SubmissionsCommand,
};
use portfolio_contact::notify::Notifier;
use portfolio_contact::submission::Submission;
use portfolio_contact::{http, init_logging, Config, ContactService, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, serve_cmd).await,
        Command::Submissions(cmd) => handle_submissions(&config, cmd),
        Command::Email(cmd) => handle_email(&config, cmd).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(bind) = cmd.bind {
        config.server.bind = bind;
    }

    let service = ContactService::from_config(&config).with_context(|| {
        format!(
            "failed to open database at {}",
            config.database_path().display()
        )
    })?;
    info!("Database: {}", config.database_path().display());

    if let Some(max_age) = config.max_age() {
        let pruned = service.prune(max_age).await?;
        if pruned > 0 {
            info!("Pruned {} submissions older than {:?}", pruned, max_age);
        }
    }

    let status = service.notifier().status();
    if status.enabled && status.credentials_configured {
        info!("Email notifications via {}:{}", status.host, status.port);
    } else {
        info!("Email notifications disabled or not configured");
    }

    http::serve(&config, service).await?;
    Ok(())
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("failed to open database at {}", path.display()))
}

fn handle_submissions(config: &Config, cmd: SubmissionsCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;

    match cmd {
        SubmissionsCommand::List {
            status,
            limit,
            json,
        } => {
            let submissions = match status {
                Some(status) => storage.get_by_status(status, limit)?,
                None => storage.get_recent(limit)?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&submissions)?);
            } else if submissions.is_empty() {
                println!("No submissions.");
            } else {
                for submission in &submissions {
                    print_summary_line(submission);
                }
            }
        }
        SubmissionsCommand::Show { id, json } => {
            let Some(submission) = storage.get(id)? else {
                bail!("no submission with id {id}");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&submission)?);
            } else {
                print_submission(&submission);
            }
        }
        SubmissionsCommand::Mark { id, status } => {
            if !storage.set_status(id, status)? {
                bail!("no submission with id {id}");
            }
            println!("Submission {id} marked {status}.");
        }
        SubmissionsCommand::Spam { id, clear } => {
            if !storage.mark_spam(id, !clear)? {
                bail!("no submission with id {id}");
            }
            if clear {
                println!("Submission {id} is no longer flagged as spam.");
            } else {
                println!("Submission {id} flagged as spam.");
            }
        }
        SubmissionsCommand::Delete { id } => {
            if !storage.delete(id)? {
                bail!("no submission with id {id}");
            }
            println!("Submission {id} deleted.");
        }
        SubmissionsCommand::Stats { json } => {
            let stats = storage.stats(chrono::Utc::now())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Submission Statistics");
                println!("=====================");
                println!("Total:        {}", stats.total);
                println!("Today:        {}", stats.today);
                println!("This week:    {}", stats.this_week);
                println!("Spam:         {}", stats.spam);
                for (status, count) in &stats.by_status {
                    println!("  {:<10}  {}", status.as_str(), count);
                }
                if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                    println!("Oldest:       {}", oldest.to_rfc3339());
                    println!("Newest:       {}", newest.to_rfc3339());
                }
            }
        }
        SubmissionsCommand::Prune { days } => {
            let max_age = match days {
                Some(0) => bail!("--days must be greater than 0"),
                Some(days) => chrono::Duration::days(i64::from(days)),
                None => match config.max_age() {
                    Some(age) => chrono::Duration::from_std(age)?,
                    None => {
                        println!(
                            "Retention is unlimited (storage.max_age_days = 0); nothing to prune."
                        );
                        return Ok(());
                    }
                },
            };
            let pruned = storage.prune_older_than(max_age)?;
            println!(
                "Pruned {pruned} submissions older than {} days ({} remaining).",
                max_age.num_days(),
                storage.count()?
            );
        }
    }
    Ok(())
}

fn print_summary_line(submission: &Submission) {
    println!(
        "{:>5}  {}  {:<8} {}{} <{}>  {}",
        submission.id.unwrap_or_default(),
        submission.timestamp.format("%Y-%m-%d %H:%M"),
        submission.status.as_str(),
        if submission.is_spam { "[spam] " } else { "" },
        submission.name,
        submission.email,
        submission.subject,
    );
}

fn print_submission(submission: &Submission) {
    println!("Id:          {}", submission.id.unwrap_or_default());
    println!("Received:    {}", submission.timestamp.to_rfc3339());
    println!("Status:      {}", submission.status);
    println!("Spam:        {}", submission.is_spam);
    println!("From:        {} <{}>", submission.name, submission.email);
    println!("Subject:     {}", submission.subject);
    println!("IP address:  {}", submission.ip_address);
    println!("User agent:  {}", submission.user_agent);
    println!();
    println!("{}", submission.message);
}

async fn handle_email(config: &Config, cmd: EmailCommand) -> anyhow::Result<()> {
    let notifier = Notifier::from_config(&config.email);

    match cmd {
        EmailCommand::Status { json } => {
            let status = notifier.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Email Status");
                println!("============");
                println!("Enabled:          {}", status.enabled);
                println!("Credentials:      {}", status.credentials_configured);
                println!("Host:             {}:{}", status.host, status.port);
                println!("Implicit TLS:     {}", status.secure);
                println!("Sender set:       {}", status.sender_configured);
                println!("Operator set:     {}", status.operator_configured);
            }
        }
        EmailCommand::Verify => {
            let reachable = tokio::time::timeout(
                config.email.timeout() + Duration::from_secs(5),
                notifier.verify(),
            )
            .await
            .context("timed out connecting to the mail server")??;
            if !reachable {
                bail!("mail server rejected the connection");
            }
            println!(
                "Connected to {}:{} successfully.",
                config.email.host, config.email.port
            );
        }
        EmailCommand::Test { to } => {
            let receipt = notifier
                .send_test(&to)
                .await
                .with_context(|| format!("failed to send test email to {to}"))?;
            println!("Test email sent to {to}: {}", receipt.response);
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                let mut redacted = config.clone();
                if redacted.email.password.is_some() {
                    redacted.email.password = Some("***".to_string());
                }
                println!("{}", serde_json::to_string_pretty(&redacted)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Bind:               {}", config.server.bind);
                println!("  CORS origins:       {}", config.server.cors_origins.join(", "));
                println!(
                    "  Trust proxy hdrs:   {}",
                    config.server.trust_forwarded_headers
                );
                println!("  Max body (bytes):   {}", config.server.max_body_bytes);
                println!(
                    "  Request limit:      {} per {}s",
                    config.server.request_limit, config.server.request_window_secs
                );
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Max age (days):     {}", config.storage.max_age_days);
                println!();
                println!("[Admission]");
                println!(
                    "  Per IP:             {} per {}s",
                    config.admission.max_per_ip, config.admission.ip_window_secs
                );
                println!(
                    "  Duplicate window:   {}s",
                    config.admission.duplicate_window_secs
                );
                println!();
                println!("[Email]");
                println!("  Enabled:            {}", config.email.enabled);
                println!(
                    "  Server:             {}:{}",
                    config.email.host, config.email.port
                );
                println!("  Credentials:        {}", config.email.has_credentials());
                println!(
                    "  Sender:             {}",
                    config.email.sender().unwrap_or("(none)")
                );
                println!(
                    "  Operator:           {}",
                    config.email.operator().unwrap_or("(none)")
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
