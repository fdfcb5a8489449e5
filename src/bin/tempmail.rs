#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for the temp-mail service: run the server, manage aliases, read
//! inboxes and ingest the catch-all mailbox

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tempmail::check::CheckReport;
use tempmail::inbox::InboxView;
use tempmail::{Alias, AppConfig, Store, alias, check, inbox, notify, receiver, web};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tempmail")]
#[command(about = "Disposable email addresses on a catch-all IMAP mailbox")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,

    /// Generate a new alias
    Generate,

    /// List aliases
    Aliases {
        /// Only aliases containing this text
        #[arg(long)]
        search: Option<String>,
    },

    /// Show the live inbox of an alias
    Inbox {
        /// Alias id
        id: i64,
    },

    /// Copy messages for known aliases into the notification table
    Receive,

    /// Print notifications as they arrive
    Watch {
        /// Start after this notification id
        #[arg(long, default_value = "0")]
        last_id: i64,

        /// Poll interval in seconds
        #[arg(long, default_value = "5")]
        interval: u64,
    },

    /// Check the mailbox connection and how an address is found
    Check {
        /// Address to try each recipient search with
        #[arg(long)]
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;
    let store = Store::connect(&config.database_url)
        .await
        .context("Database connection failed. Please try again later.")?;

    match &args.command {
        Command::Serve => {
            let shutdown = shutdown_on_ctrl_c();
            web::serve(&config, store, shutdown).await?;
        }
        Command::Generate => {
            let alias = alias::generate(&store, &config.alias_domain).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&alias)?);
            } else {
                println!("{}", alias.email);
            }
        }
        Command::Aliases { search } => {
            let aliases = store.aliases(search.as_deref()).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&aliases)?);
            } else {
                print_alias_table(&aliases);
            }
        }
        Command::Inbox { id } => {
            let view = inbox::view(&store, &config.imap, *id).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_inbox(&view);
            }
        }
        Command::Receive => {
            let report = receiver::receive(&store, &config.imap).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Total emails processed: {}", report.scanned);
                println!("Successfully stored: {}", report.stored);
            }
        }
        Command::Watch { last_id, interval } => {
            cmd_watch(&args, store, *last_id, *interval).await?;
        }
        Command::Check { address } => {
            let report = check::check(&config.imap, address.as_deref())
                .await
                .context("Mailbox check failed")?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_check(&report);
            }
        }
    }

    Ok(())
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        trigger.cancel();
    });
    token
}

async fn cmd_watch(args: &Args, store: Store, last_id: i64, interval: u64) -> anyhow::Result<()> {
    let interval = if interval == 0 {
        notify::DEFAULT_INTERVAL
    } else {
        Duration::from_secs(interval)
    };

    let cancel = shutdown_on_ctrl_c();
    let (tx, mut rx) = mpsc::channel(64);
    let poller = notify::spawn_poller(store, interval, last_id, cancel, tx);

    while let Some(notification) = rx.recv().await {
        if args.json {
            println!("{}", serde_json::to_string(&notification)?);
        } else {
            println!(
                "[{}] {} <- {}: {}",
                notification.id,
                notification.to_email,
                truncate(&notification.subject, 40),
                truncate(&notification.message, 60),
            );
        }
    }

    let cursor = poller.await?;
    eprintln!("Stopped at notification {cursor}");
    Ok(())
}

fn print_alias_table(aliases: &[Alias]) {
    if aliases.is_empty() {
        println!("No aliases found.");
        return;
    }

    println!("{:<6} {:<36} Recent", "ID", "Email");
    println!("{}", "-".repeat(90));

    for alias in aliases {
        println!(
            "{:<6} {:<36} {}",
            alias.id,
            truncate(&alias.email, 34),
            alias.recent_message,
        );
    }

    println!("\n{} alias(es)", aliases.len());
}

fn print_inbox(view: &InboxView) {
    println!("Inbox: {}", view.alias.email);
    if let Some(error) = &view.error {
        println!("Error: {error}");
    }
    if let Some(diagnostic) = &view.diagnostic {
        println!("({diagnostic})");
    }

    if view.messages.is_empty() {
        println!("\nNo emails found.");
        return;
    }

    for message in &view.messages {
        println!("\n{}", "-".repeat(60));
        println!("From:    {}", message.from);
        println!("Date:    {}", message.date);
        println!("Subject: {}", message.subject);
        println!();
        println!("{}", message.body.trim());
    }

    println!("\n{} email(s)", view.messages.len());
}

fn print_check(report: &CheckReport) {
    println!(
        "Connected to {}:{} as {}",
        report.host, report.port, report.username
    );
    println!("Selected {}", report.folder);
    println!("Messages: {}", report.contents.total);

    if let Some(newest) = &report.contents.newest {
        println!("\nNewest message (#{}):", newest.sequence);
        println!("  From:    {}", newest.from.as_deref().unwrap_or("N/A"));
        println!("  To:      {}", newest.to.join(", "));
        println!("  Subject: {}", newest.subject.as_deref().unwrap_or("(No Subject)"));
        println!("  Date:    {}", newest.date.as_deref().unwrap_or("Unknown"));
    }

    let Some(address) = &report.contents.address else {
        return;
    };
    println!("\nAddress {}:", address.address);
    for outcome in &address.strategies {
        match &outcome.error {
            Some(error) => println!("  {}: failed ({error})", outcome.strategy),
            None => println!("  {}: {} message(s)", outcome.strategy, outcome.found),
        }
    }
    match address.matched {
        Some(strategy) => println!("Inbox views use the {strategy}"),
        None => println!("No strategy finds this address"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
