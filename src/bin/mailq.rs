//! mailq CLI — push messages through the worker pool, poke the record store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use mailq::config::Config;
use mailq::config::secrets::ExposeSecret;
use mailq::db::{Db, MemoryRecords, RecordStore};
use mailq::latch::CountdownLatch;
use mailq::model::RecordId;
use mailq::telemetry::{TelemetryConfig, init_telemetry};
use mailq::{Completion, Dispatcher, Mailbox};

#[derive(Parser)]
#[command(name = "mailq", about = "Bounded async mail dispatcher")]
struct Cli {
    /// TOML config file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send messages through the worker pool and wait for every one to finish
    Send {
        /// Message payloads
        #[arg(required = true)]
        messages: Vec<String>,
        /// Override the configured worker count
        #[arg(long)]
        workers: Option<usize>,
        /// Override the configured per-message latency (microseconds)
        #[arg(long)]
        latency_us: Option<u64>,
    },
    /// Record store operations
    Record {
        /// Use a throwaway in-memory store instead of Postgres
        #[arg(long)]
        memory: bool,
        #[command(subcommand)]
        action: RecordAction,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Save a value and print its id
    Save { value: String },
    /// Print the value stored under an id
    Lookup { id: String },
    /// Save a value, then read it back by id
    Roundtrip { value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = match cli.config.as_deref() {
        Some(path) => Config::load(Some(path))?,
        None => Config::from_env()?,
    };

    let mut telemetry = TelemetryConfig::new("mailq");
    telemetry.endpoint = config.otel_endpoint.clone();
    telemetry.default_filter = config.log_level.clone();
    let _guard = init_telemetry(telemetry)?;

    match cli.command {
        Command::Send {
            messages,
            workers,
            latency_us,
        } => {
            if let Some(n) = workers {
                config.dispatcher.workers = n;
            }
            if let Some(us) = latency_us {
                config.dispatcher.latency_us = us;
            }
            cmd_send(&config, messages).await
        }
        Command::Record { memory, action } => {
            if memory {
                cmd_record(&MemoryRecords::new(), action).await
            } else {
                let url = config.require_database_url()?;
                let db = Db::connect(url.expose_secret()).await?;
                db.migrate().await?;
                cmd_record(&db, action).await
            }
        }
    }
}

async fn cmd_send(config: &Config, messages: Vec<String>) -> anyhow::Result<()> {
    let mailbox = Arc::new(Mailbox::new());
    let latch = Arc::new(CountdownLatch::new(messages.len()));

    let l = Arc::clone(&latch);
    mailbox.set_hook(move |completion| {
        if let Completion::Failed { message, reason } = completion {
            eprintln!("failed: {message}: {reason}");
        }
        l.count_down();
    });

    let dispatcher = Dispatcher::new(config.dispatcher.clone(), Arc::clone(&mailbox))?;
    let started = Instant::now();

    for message in messages {
        if let Err(e) = dispatcher.submit(message.clone()) {
            // Rejected submissions never reach the mailbox.
            eprintln!("rejected {message:?}: {e}");
            latch.count_down();
        }
    }

    latch.wait().await;
    dispatcher.shutdown().await;

    println!("Distinct:   {}", mailbox.count());
    println!("Deliveries: {}", mailbox.deliveries());
    println!("Failures:   {}", mailbox.failures().len());
    println!("Elapsed:    {}ms", started.elapsed().as_millis());
    Ok(())
}

async fn cmd_record(store: &impl RecordStore, action: RecordAction) -> anyhow::Result<()> {
    match action {
        RecordAction::Save { value } => {
            let id = store.save(&value).await?;
            println!("{id}");
        }
        RecordAction::Lookup { id } => {
            let id: RecordId = id.parse()?;
            println!("{}", store.lookup(id).await?);
        }
        RecordAction::Roundtrip { value } => {
            let id = store.save(&value).await?;
            let stored = store.lookup(id).await?;
            println!("id = {id}");
            println!("value = {stored}");
        }
    }
    Ok(())
}
