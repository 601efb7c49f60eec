// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! MailHub demo runner.
//!
//! Seeds the in-memory backend from an accounts file, starts one scheduler
//! per account and streams every core event to stdout as a JSON line until
//! Ctrl-C.
//!
//! Usage:
//!   mailhub --accounts accounts.json
//!   mailhub --accounts accounts.json --check-now --config mailhub.toml

use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use mailhub::accounts_file::AccountsFile;
use mailhub::config::Settings;
use mailhub::external::DataStorage;
use mailhub::testing::{
    FakeAccountServiceFactory, FakeBackupManager, FakeBackupTransfer, FakeMailBoxFactory,
    FakeSecurityManager, FakeTokenResolver, MemoryStorage,
};
use mailhub::{MailCore, MailCoreDependencies};

#[derive(Parser, Debug)]
#[command(version, about = "Multi-account mailbox orchestration demo", long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, env = "MAILHUB_CONFIG")]
    config: Option<String>,

    /// JSON file of accounts and groups to seed storage with.
    #[arg(short, long, env = "MAILHUB_ACCOUNTS")]
    accounts: Option<String>,

    /// Application password used to unlock storage.
    #[arg(long, env = "MAILHUB_PASSWORD", default_value = "")]
    password: String,

    /// Log level, overriding the configured one.
    #[arg(long, env = "MAILHUB_LOG_LEVEL")]
    log_level: Option<String>,

    /// Check every inbox once right after startup.
    #[arg(long)]
    check_now: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::new(cli.config.as_deref())?;
    if let Some(level) = cli.log_level.clone() {
        settings.log.level = level;
    }
    env_logger::Builder::from_env(Env::default().default_filter_or(settings.log.level.as_str())).init();

    let storage = Arc::new(MemoryStorage::new());
    if let Some(path) = &cli.accounts {
        let file = AccountsFile::load(path).await?;
        for group in file.groups {
            storage.insert_group(group);
        }
        for account in &file.accounts {
            storage.add_account(account).await?;
        }
    }

    let core = MailCore::new(
        MailCoreDependencies {
            storage: storage.clone(),
            mailbox_factory: Arc::new(FakeMailBoxFactory::default()),
            service_factory: Arc::new(FakeAccountServiceFactory::default()),
            security: Arc::new(FakeSecurityManager::default()),
            backup: Arc::new(FakeBackupManager::default()),
            backup_transfer: Arc::new(FakeBackupTransfer::default()),
            token_resolver: Arc::new(FakeTokenResolver::default()),
        },
        settings,
    );

    let mut subscription = core.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize {} event: {}", event.kind(), e),
            }
        }
    });

    if !core.initialize_application(&cli.password).await? {
        error!("Invalid password");
        core.dispose().await;
        std::process::exit(1);
    }

    if let Err(e) = core.restore_from_configured_backup().await {
        warn!("Backup restore skipped: {}", e);
    }

    let composites = core.get_composite_accounts().await?;
    info!(
        "MailHub running with {} account(s) in {} composite account(s)",
        core.get_accounts().await?.len(),
        composites.len()
    );

    let shutdown = CancellationToken::new();
    if cli.check_now {
        if !core.check_for_new_inbox_messages(&shutdown).await? {
            info!("Inbox check already in progress");
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    shutdown.cancel();
    core.dispose().await;
    printer.abort();

    Ok(())
}
