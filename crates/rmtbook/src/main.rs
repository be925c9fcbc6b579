//! `rmtbook` - CLI for the rmtbook booking service
//!
//! This binary serves the HTTP API and provides maintenance commands for
//! the practice database.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;

use rmtbook::auth::{register, NewAccount};
use rmtbook::cli::{Cli, Command, ConfigCommand, JobsCommand, StatusCommand, UserCommand};
use rmtbook::jobs::{run_job_once, JobContext};
use rmtbook::model::Role;
use rmtbook::notify::LogMailer;
use rmtbook::{init_logging, Config, Storage};

const RMT_PASSWORD_ENV: &str = "RMTBOOK_RMT_PASSWORD";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Serve(serve_cmd) => {
            let mut config = config;
            serve_cmd.apply(&mut config);
            rmtbook::serve(config).await?;
        }
        Command::Jobs(jobs_cmd) => handle_jobs(config, jobs_cmd).await?,
        Command::User(user_cmd) => handle_user(&config, user_cmd)?,
        Command::Status(status_cmd) => handle_status(&config, &status_cmd)?,
        Command::Config(config_cmd) => handle_config(&config, config_cmd)?,
    }
    Ok(())
}

async fn handle_jobs(config: Config, cmd: JobsCommand) -> anyhow::Result<()> {
    let JobsCommand::Run { kind, json } = cmd;
    let storage = Storage::open(config.database_path())?;
    let ctx = JobContext {
        storage: Arc::new(tokio::sync::Mutex::new(storage)),
        config: Arc::new(config),
        mailer: Arc::new(LogMailer),
    };

    let report = run_job_once(kind, &ctx, Utc::now()).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {}", report.kind, report.summary);
    }
    Ok(())
}

fn handle_user(config: &Config, cmd: UserCommand) -> anyhow::Result<()> {
    match cmd {
        UserCommand::CreateRmt {
            email,
            first_name,
            last_name,
            password,
        } => {
            let password = match password {
                Some(password) => password,
                None => std::env::var(RMT_PASSWORD_ENV).with_context(|| {
                    format!("pass --password or set {RMT_PASSWORD_ENV}")
                })?,
            };
            let storage = Storage::open(config.database_path())?;
            let account = NewAccount {
                email,
                password,
                first_name,
                last_name,
                phone: None,
            };
            let user = register(&storage, account, Role::Rmt, Utc::now())?;
            println!("Created RMT account {} ({})", user.email, user.id);
        }
    }
    Ok(())
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let storage = Storage::open(config.database_path())?;
    let stats = storage.stats()?;
    let rmt = storage.get_rmt()?;

    if cmd.json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "rmt_account": rmt.as_ref().map(|u| &u.email),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("rmtbook status");
        println!("--------------");
        println!("Database:         {}", storage.path().display());
        println!(
            "RMT account:      {}",
            rmt.as_ref().map_or("not created", |u| u.email.as_str())
        );
        println!("Patients:         {}", stats.patients);
        println!("Appointments:     {}", stats.appointments);
        for (status, count) in &stats.appointments_by_status {
            println!("  {status:<14}  {count}");
        }
        println!("Health histories: {}", stats.health_histories);
        println!("Receipts:         {}", stats.receipts);
        println!("Unread messages:  {}", stats.unread_messages);
        println!("Database size:    {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&redacted(config))?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Listen address:     {}", config.socket_addr());
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Session]");
                println!(
                    "  Secret:             {}",
                    if config.session.secret.is_empty() { "not set" } else { "set" }
                );
                println!("  TTL (minutes):      {}", config.session.ttl_minutes);
                println!("  Cookie:             {}", config.session.cookie_name);
                println!();
                println!("[Scheduling]");
                let s = &config.scheduling;
                println!("  UTC offset (min):   {}", s.utc_offset_minutes);
                println!("  Slot increment:     {} min", s.slot_increment_minutes);
                println!("  Buffer:             {} min", s.buffer_minutes);
                println!("  Minimum notice:     {} h", s.min_notice_hours);
                println!("  Booking horizon:    {} days", s.booking_horizon_days);
                println!("  Stale rescheduling: {} min", s.stale_rescheduling_minutes);
                println!("  Reminder lead:      {} h", s.reminder_lead_hours);
                println!("  Job interval:       {} min", s.job_interval_minutes);
                println!();
                println!("[Practice]");
                println!("  Business:           {}", config.practice.business_name);
                println!("  RMT:                {}", config.practice.rmt_name);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            if !path.exists() {
                bail!("configuration file not found: {}", path.display());
            }
            println!("Validating configuration: {}", path.display());
            let loaded = Config::load_from(Some(path))?;
            if loaded.require_session_secret().is_err() {
                println!("Warning: session.secret is missing or too short; `serve` will refuse to start.");
            }
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if !config.session.secret.is_empty() {
        config.session.secret = "<redacted>".to_string();
    }
    config
}
