// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Application-facing orchestration core.
//!
//! Owns the account directory, one scheduler per account, the sync engine
//! and the event hub. Every operation fails with `CoreError::Disposed` once
//! [`MailCore::dispose`] has run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Settings;
use crate::error::{CoreError, FolderFailure, Result};
use crate::external::account_service::{AccountService, AccountServiceFactory};
use crate::external::backup::{BackupManager, BackupTransfer, RestoredBackup};
use crate::external::mailbox::MailBoxFactory;
use crate::external::security::SecurityManager;
use crate::external::storage::DataStorage;
use crate::models::{
    Account, Contact, ContactAvatar, EmailAddress, Folder, MailProtocol, Message, NO_GROUP,
};
use crate::services::composite::{all_accounts_inbox, build_composite_accounts, CompositeAccount, CompositeFolder};
use crate::services::credentials::{CredentialsManager, CredentialsProvider, TokenResolver};
use crate::services::directory::AccountDirectory;
use crate::services::events::{EventHub, Subscription};
use crate::services::pagination::{earlier_messages, ContactMessages, FolderMessages, PageEntry};
use crate::services::scheduler::{AccountScheduler, FailureReporter, SchedulerState, SyncCallback};
use crate::services::sync::{FailureLog, SyncEngine};

const DECENTRALIZED_ACCOUNT_IDENTITY: &str = "Decentralized Account";

/// External collaborators the core is built from.
pub struct MailCoreDependencies {
    pub storage: Arc<dyn DataStorage>,
    pub mailbox_factory: Arc<dyn MailBoxFactory>,
    pub service_factory: Arc<dyn AccountServiceFactory>,
    pub security: Arc<dyn SecurityManager>,
    pub backup: Arc<dyn BackupManager>,
    pub backup_transfer: Arc<dyn BackupTransfer>,
    pub token_resolver: Arc<dyn TokenResolver>,
}

#[derive(Debug, Clone, Copy)]
enum MessageCommand {
    MarkRead,
    MarkUnread,
    Flag,
    Unflag,
}

pub struct MailCore {
    storage: Arc<dyn DataStorage>,
    mailbox_factory: Arc<dyn MailBoxFactory>,
    security: Arc<dyn SecurityManager>,
    backup: Arc<dyn BackupManager>,
    backup_transfer: Arc<dyn BackupTransfer>,
    credentials: Arc<CredentialsManager>,
    directory: Arc<AccountDirectory>,
    sync: Arc<SyncEngine>,
    schedulers: DashMap<EmailAddress, Arc<AccountScheduler>>,
    events: EventHub,
    settings: Settings,
    disposed: AtomicBool,
}

impl MailCore {
    pub fn new(deps: MailCoreDependencies, settings: Settings) -> Arc<Self> {
        let events = EventHub::new(settings.events.history_size);
        deps.storage.attach_event_hub(events.clone());

        let credentials = Arc::new(CredentialsManager::new(
            Arc::clone(&deps.storage),
            deps.token_resolver,
        ));
        let directory = Arc::new(AccountDirectory::new(
            Arc::clone(&deps.storage),
            Arc::clone(&deps.mailbox_factory),
            deps.service_factory,
            Arc::clone(&deps.security),
            Arc::clone(&credentials),
            events.clone(),
        ));
        let sync = Arc::new(SyncEngine::new(
            Arc::clone(&directory),
            events.clone(),
            settings.sync.clone(),
        ));

        info!("Mail core created");
        Arc::new(Self {
            storage: deps.storage,
            mailbox_factory: deps.mailbox_factory,
            security: deps.security,
            backup: deps.backup,
            backup_transfer: deps.backup_transfer,
            credentials,
            directory,
            sync,
            schedulers: DashMap::new(),
            events,
            settings,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn directory(&self) -> &Arc<AccountDirectory> {
        &self.directory
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn check_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            Err(CoreError::Disposed)
        } else {
            Ok(())
        }
    }

    // Application lifecycle

    /// Unlocks storage and starts a scheduler for every stored account.
    /// Returns `false` on a wrong password.
    pub async fn initialize_application(&self, password: &str) -> Result<bool> {
        self.check_disposed()?;
        match self.security.start(password).await {
            Ok(()) => {}
            Err(CoreError::InvalidPassword) => {
                warn!("Application start rejected: invalid password");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
        self.start_all_schedulers().await;
        Ok(true)
    }

    async fn start_all_schedulers(&self) {
        self.dispose_schedulers().await;

        match self.directory.load_accounts().await {
            Ok((accounts, _)) => {
                for account in &accounts {
                    self.add_and_start_scheduler(account);
                }
                info!("Started {} account scheduler(s)", accounts.len());
            }
            Err(e) => error!("Failed to load accounts for scheduling: {}", e),
        }
    }

    pub async fn reset_application(&self) -> Result<()> {
        self.check_disposed()?;
        self.events.publish_wipe_all_data();
        self.security.reset().await
    }

    pub async fn is_first_application_start(&self) -> Result<bool> {
        self.check_disposed()?;
        self.security.is_never_started().await
    }

    /// Returns `false` when `current` is wrong.
    pub async fn change_application_password(&self, current: &str, new: &str) -> Result<bool> {
        self.check_disposed()?;
        match self.security.change_password(current, new).await {
            Ok(()) => Ok(true),
            Err(CoreError::InvalidPassword) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Cancels every scheduler, waits for in-flight passes (manual ones
    /// included) and closes storage. Later calls are no-ops.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Disposing mail core");
        self.dispose_schedulers().await;
        self.sync.shutdown().await;
        self.directory.clear();
        self.storage.close().await;
        info!("Mail core disposed");
    }

    async fn dispose_schedulers(&self) {
        let schedulers: Vec<Arc<AccountScheduler>> = self
            .schedulers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for scheduler in &schedulers {
            scheduler.cancel();
        }
        join_all(schedulers.iter().map(|s| s.dispose())).await;
        self.schedulers.clear();
    }

    // Schedulers

    fn add_and_start_scheduler(&self, account: &Account) {
        if self.schedulers.contains_key(&account.email) {
            return;
        }

        let email = account.email.clone();
        let interval = account.synchronization_period(self.settings.sync.default_interval_minutes);
        let scheduler = Arc::new(AccountScheduler::new(
            email.clone(),
            interval,
            self.sync_callback(&email),
            self.failure_reporter(),
        ));

        let scheduler = Arc::clone(self.schedulers.entry(email.clone()).or_insert(scheduler).value());
        if scheduler.start() {
            debug!("Scheduler for {} started with {:?}", email, interval);
        }
    }

    fn sync_callback(&self, email: &EmailAddress) -> SyncCallback {
        let sync = Arc::clone(&self.sync);
        let email = email.clone();
        Arc::new(move |token: CancellationToken| {
            let sync = Arc::clone(&sync);
            let email = email.clone();
            async move { sync.scheduled_pass(&email, &token).await }.boxed()
        })
    }

    fn failure_reporter(&self) -> FailureReporter {
        let events = self.events.clone();
        let failures = self.sync.failures();
        let report = self.settings.sync.report_scheduler_failures;
        Arc::new(move |email: &EmailAddress, error: &CoreError| {
            // Folder failures are already in the log
            if !matches!(error, CoreError::NewMessagesCheckFailed(_)) {
                failures.record(FolderFailure::new(email.clone(), None, error));
            }
            if report {
                events.publish_exception(Some(email.clone()), error.to_string());
            }
        })
    }

    fn update_scheduler_interval(&self, account: &Account) {
        let interval = account.synchronization_period(self.settings.sync.default_interval_minutes);
        let existing = self
            .schedulers
            .get(&account.email)
            .map(|entry| Arc::clone(entry.value()));
        match existing {
            Some(scheduler) => scheduler.set_interval(interval),
            None => self.add_and_start_scheduler(account),
        }
    }

    async fn remove_scheduler(&self, email: &EmailAddress) {
        if let Some((_, scheduler)) = self.schedulers.remove(email) {
            scheduler.cancel();
            scheduler.dispose().await;
            debug!("Scheduler for {} disposed", email);
        }
    }

    /// Runs the scheduled pass of `email` now, outside its timer. `false`
    /// when a pass is already in flight or the account has no scheduler.
    pub async fn run_scheduled_pass_now(&self, email: &EmailAddress) -> Result<bool> {
        self.check_disposed()?;
        let scheduler = self.schedulers.get(email).map(|entry| Arc::clone(entry.value()));
        match scheduler {
            Some(scheduler) => Ok(scheduler.run_now().await),
            None => Ok(false),
        }
    }

    pub fn scheduler_count(&self) -> usize {
        self.schedulers.len()
    }

    pub fn scheduler_interval(&self, email: &EmailAddress) -> Option<Duration> {
        self.schedulers.get(email).map(|s| s.interval())
    }

    pub fn scheduler_state(&self, email: &EmailAddress) -> Option<SchedulerState> {
        self.schedulers.get(email).map(|s| s.state())
    }

    /// Failures absorbed by passes and schedulers, oldest first.
    pub fn failure_history(&self) -> Vec<FolderFailure> {
        self.sync.failures().snapshot()
    }

    pub fn failure_log(&self) -> Arc<FailureLog> {
        self.sync.failures()
    }

    // Accounts

    pub async fn exists_account(&self, email: &EmailAddress) -> Result<bool> {
        self.check_disposed()?;
        self.storage.exists_account_with_email_address(email).await
    }

    pub async fn get_account(&self, email: &EmailAddress) -> Result<Account> {
        self.check_disposed()?;
        self.storage.get_account(email).await
    }

    pub async fn get_accounts(&self) -> Result<Vec<Account>> {
        self.check_disposed()?;
        self.storage.get_accounts().await
    }

    pub async fn get_composite_accounts(&self) -> Result<Vec<CompositeAccount>> {
        self.check_disposed()?;
        let (accounts, groups) = self.directory.load_accounts().await?;
        build_composite_accounts(&self.directory, &accounts, &groups).await
    }

    pub async fn get_account_service(&self, email: &EmailAddress) -> Result<Arc<dyn AccountService>> {
        self.check_disposed()?;
        let account = self.storage.get_account(email).await?;
        self.directory.account_service(&account).await
    }

    /// Service of `email` from the caches, then from storage.
    async fn service_for_address(&self, email: &EmailAddress) -> Result<Arc<dyn AccountService>> {
        if let Some(service) = self.directory.service_by_email(email).await? {
            return Ok(service);
        }
        let account = self.storage.get_account(email).await?;
        self.directory.account_service(&account).await
    }

    /// Asks the backend for the folder structure, then stores the account
    /// and starts its scheduler.
    ///
    /// Credentials are bound to the in-flight record, so a refresh token
    /// rotated while listing folders is the one that gets stored.
    pub async fn add_account(&self, account: Account, cancel: &CancellationToken) -> Result<()> {
        self.check_disposed()?;
        if self.storage.exists_account_with_email_address(&account.email).await? {
            return Err(CoreError::AccountAlreadyExists(account.email));
        }

        let record = Arc::new(Mutex::new(account));
        let pending_account = record.lock().await.clone();
        let credentials = self.credentials.create_credentials_provider(Arc::clone(&record)).await;
        let mailbox = self.mailbox_factory.create_mailbox(&pending_account, credentials)?;
        let folders = mailbox.get_folders_structure(cancel).await?;

        let account = {
            let mut pending = record.lock().await;
            pending.set_folders_structure(folders);
            pending.clone()
        };
        self.add_account_to_storage(account).await
    }

    /// Checks that a server accepts `credentials` before an account is
    /// created for it.
    pub async fn test_mail_server(
        &self,
        server_address: &str,
        server_port: u16,
        protocol: MailProtocol,
        credentials: Arc<dyn CredentialsProvider>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.check_disposed()?;
        debug!("Testing {:?} server {}:{}", protocol, server_address, server_port);
        self.mailbox_factory
            .test_mail_server(server_address, server_port, protocol, credentials, cancel)
            .await
    }

    async fn add_account_to_storage(&self, account: Account) -> Result<()> {
        self.storage.add_account(&account).await?;
        self.security.create_default_pgp_keys(&account).await?;

        self.directory.upsert_account(account.clone());
        self.add_and_start_scheduler(&account);

        info!("Account {} added", account.email);
        self.events.publish_account_added(account);
        Ok(())
    }

    /// Persists `account`, retunes (or starts) its scheduler and publishes
    /// `account_updated`.
    pub async fn update_account(&self, account: Account) -> Result<()> {
        self.check_disposed()?;
        self.storage.update_account(&account).await?;
        self.directory.upsert_account(account.clone());
        self.update_scheduler_interval(&account);
        self.events.publish_account_updated(account);
        Ok(())
    }

    /// Removes the account with its folders, service, scheduler and every
    /// cache entry keyed by its address.
    pub async fn delete_account(&self, account: &Account) -> Result<()> {
        self.check_disposed()?;

        // No pass may run, or recreate the service, once eviction starts
        self.remove_scheduler(&account.email).await;
        self.directory.remove_account(&account.email);
        self.sync.forget_account(&account.email).await;
        self.directory.remove_account_service(&account.email);

        for folder in &account.folders_structure {
            self.storage.delete_folder(&account.email, &folder.full_name).await?;
        }

        self.storage.delete_account(account).await?;

        info!("Account {} deleted", account.email);
        self.events.publish_account_deleted(account.clone());
        Ok(())
    }

    /// New, unsaved account bound to a freshly derived decentralized address.
    pub async fn new_decentralized_account(&self) -> Result<Account> {
        self.check_disposed()?;
        let mut settings = self.storage.get_settings().await?;
        let tag = format!(
            "{} Demo #{}",
            DECENTRALIZED_ACCOUNT_IDENTITY, settings.decentralized_account_counter
        );
        let public_key = self.security.derive_decentralized_key(&tag).await?;
        settings.decentralized_account_counter += 1;
        self.storage.set_settings(&settings).await?;

        let mut account = Account::new(EmailAddress::decentralized(&public_key, tag.clone()));
        account.is_backup_account_settings_enabled = true;
        account.is_backup_account_messages_enabled = true;
        account.key_tag = Some(tag);
        Ok(account)
    }

    /// Adds the hybrid counterpart of `email` and groups it with its origin.
    pub async fn create_hybrid_email(&self, email: &EmailAddress, cancel: &CancellationToken) -> Result<()> {
        self.check_disposed()?;
        let mut existing = self.storage.get_account(email).await?;

        let public_key = self.security.email_public_key(&existing.email).await?;
        let hybrid = existing.email.make_hybrid(&public_key);

        if self.directory.has_account_service(&hybrid)
            || self.storage.exists_account_with_email_address(&hybrid).await?
        {
            debug!("Hybrid account {} already exists", hybrid);
            return Ok(());
        }

        if existing.group_id == NO_GROUP {
            let group = self.storage.add_account_group(existing.email.name()).await?;
            existing.group_id = group.id;
            self.directory.upsert_group(group);
            self.storage.update_account(&existing).await?;
            self.directory.upsert_account(existing.clone());
        }

        let mut hybrid_account = Account::new(hybrid);
        hybrid_account.is_backup_account_settings_enabled = true;
        hybrid_account.is_backup_account_messages_enabled = true;
        hybrid_account.group_id = existing.group_id;
        hybrid_account.key_tag = Some(existing.email.address().to_string());

        self.add_account(hybrid_account, cancel).await
    }

    // New message checks

    /// Manual check of one composite folder; `false` when another manual
    /// check is still running.
    pub async fn check_for_new_messages_in_folder(
        &self,
        folder: &CompositeFolder,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        self.check_disposed()?;
        self.sync.check_composite_folder(folder, cancel).await
    }

    /// Manual check of every account's inbox; `false` when another manual
    /// check is still running.
    pub async fn check_for_new_inbox_messages(&self, cancel: &CancellationToken) -> Result<bool> {
        self.check_disposed()?;
        let (accounts, _) = self.directory.load_accounts().await?;
        let emails: Vec<EmailAddress> = accounts.into_iter().map(|a| a.email).collect();
        Ok(self.sync.check_inboxes(&emails, cancel).await)
    }

    // Earlier messages

    pub async fn get_folder_earlier_messages(
        &self,
        folder: &Folder,
        count: usize,
        last: Option<&Message>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageEntry>> {
        self.check_disposed()?;
        // Makes sure the folder's service is cached
        self.get_account_service(&folder.account_email).await?;
        let composite = CompositeFolder::new(vec![folder.clone()], Arc::clone(&self.directory));
        self.get_composite_folder_earlier_messages(&composite, count, last, cancel)
            .await
    }

    pub async fn get_composite_folder_earlier_messages(
        &self,
        folder: &CompositeFolder,
        count: usize,
        last: Option<&Message>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageEntry>> {
        self.check_disposed()?;
        let stored = FolderMessages {
            storage: self.storage.as_ref(),
            folders: folder.folders(),
        };
        earlier_messages(
            folder,
            &stored,
            count,
            last,
            self.settings.sync.receive_batch_size,
            cancel,
        )
        .await
    }

    pub async fn get_all_earlier_messages(
        &self,
        count: usize,
        last: Option<&Message>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageEntry>> {
        self.check_disposed()?;
        let inbox = self.all_accounts_inbox().await?;
        self.get_composite_folder_earlier_messages(&inbox, count, last, cancel)
            .await
    }

    pub async fn get_contact_earlier_messages(
        &self,
        contact: &EmailAddress,
        count: usize,
        last: Option<&Message>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PageEntry>> {
        self.check_disposed()?;
        let inbox = self.all_accounts_inbox().await?;
        let stored = ContactMessages {
            storage: self.storage.as_ref(),
            contact,
        };
        earlier_messages(
            &inbox,
            &stored,
            count,
            last,
            self.settings.sync.receive_batch_size,
            cancel,
        )
        .await
    }

    async fn all_accounts_inbox(&self) -> Result<CompositeFolder> {
        let accounts = self.storage.get_accounts().await?;
        all_accounts_inbox(&self.directory, &accounts).await
    }

    // Unread counts

    pub async fn get_unread_count_for_all_accounts(&self) -> Result<usize> {
        self.check_disposed()?;
        let accounts = self.storage.get_accounts().await?;
        let mut total = 0;
        for account in &accounts {
            let service = self.directory.account_service(account).await?;
            total += service.get_unread_messages_count().await?;
        }
        Ok(total)
    }

    pub async fn get_unread_messages_count_by_contact(&self) -> Result<Vec<(EmailAddress, usize)>> {
        self.check_disposed()?;
        self.storage.get_unread_messages_count_by_contact().await
    }

    // Contacts

    pub async fn get_contacts(&self) -> Result<Vec<Contact>> {
        self.check_disposed()?;
        self.storage.get_contacts().await
    }

    /// No-op for unknown contacts.
    pub async fn set_contact_avatar(&self, email: &EmailAddress, avatar: ContactAvatar) -> Result<()> {
        self.check_disposed()?;
        if self.storage.exists_contact_with_email_address(email).await? {
            self.storage.set_contact_avatar(email, avatar).await?;
            let contact = self.storage.get_contact(email).await?;
            self.events.publish_contact_changed(contact);
        }
        Ok(())
    }

    /// No-op for unknown contacts.
    pub async fn remove_contact(&self, email: &EmailAddress) -> Result<()> {
        self.check_disposed()?;
        if self.storage.exists_contact_with_email_address(email).await? {
            self.storage.remove_contact(email).await?;
            self.events.publish_contact_deleted(email.clone());
        }
        Ok(())
    }

    // Message commands

    /// Deletes `messages` folder by folder. Messages of folders whose account
    /// is gone are skipped.
    pub async fn delete_messages(&self, messages: &[Message]) -> Result<()> {
        self.check_disposed()?;
        for (folder, batch) in group_by_folder(messages) {
            match self.directory.service_for_folder(&folder).await? {
                Some(service) => service.delete_messages(&folder, &batch).await?,
                None => debug!("Skipping delete in {} of unknown account", folder.full_name),
            }
        }
        Ok(())
    }

    pub async fn mark_messages_as_read(&self, messages: &[Message]) -> Result<()> {
        self.apply_message_command(messages, MessageCommand::MarkRead).await
    }

    pub async fn mark_messages_as_unread(&self, messages: &[Message]) -> Result<()> {
        self.apply_message_command(messages, MessageCommand::MarkUnread).await
    }

    pub async fn flag_messages(&self, messages: &[Message]) -> Result<()> {
        self.apply_message_command(messages, MessageCommand::Flag).await
    }

    pub async fn unflag_messages(&self, messages: &[Message]) -> Result<()> {
        self.apply_message_command(messages, MessageCommand::Unflag).await
    }

    async fn apply_message_command(&self, messages: &[Message], command: MessageCommand) -> Result<()> {
        self.check_disposed()?;

        let mut batches: Vec<(Arc<dyn AccountService>, Vec<Message>)> = Vec::new();
        for message in messages {
            let Some(service) = self.directory.service_for_folder(&message.folder).await? else {
                // Folder's account was deleted
                continue;
            };
            match batches.iter_mut().find(|(s, _)| s.email() == service.email()) {
                Some((_, batch)) => batch.push(message.clone()),
                None => batches.push((service, vec![message.clone()])),
            }
        }

        for (service, batch) in batches {
            match command {
                MessageCommand::MarkRead => service.mark_messages_as_read(&batch).await?,
                MessageCommand::MarkUnread => service.mark_messages_as_unread(&batch).await?,
                MessageCommand::Flag => service.flag_messages(&batch).await?,
                MessageCommand::Unflag => service.unflag_messages(&batch).await?,
            }
        }
        Ok(())
    }

    pub async fn get_message_body(&self, message: &Message) -> Result<Message> {
        self.check_disposed()?;
        let service = self
            .directory
            .service_for_folder(&message.folder)
            .await?
            .ok_or_else(|| CoreError::AccountNotFound(message.folder.account_email.clone()))?;
        service.get_message_body(message).await
    }

    /// Sends through the account of the first sender; a hybrid sender also
    /// sends through its original address, concurrently.
    pub async fn send_message(&self, message: &Message, encrypt: bool, sign: bool) -> Result<()> {
        self.check_disposed()?;
        let from = first_sender(message)?;

        let mut senders = vec![from.clone()];
        if let Some(original) = from.original_address() {
            senders.push(original.clone());
        }

        let mut services = Vec::with_capacity(senders.len());
        for sender in &senders {
            services.push(self.service_for_address(sender).await?);
        }

        let results = join_all(
            services
                .iter()
                .map(|service| service.send_message(message, encrypt, sign)),
        )
        .await;
        results.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }

    pub async fn create_draft_message(&self, message: &Message) -> Result<Message> {
        self.check_disposed()?;
        let service = self.service_for_address(first_sender(message)?).await?;
        service.create_draft_message(message).await
    }

    pub async fn update_draft_message(&self, id: u32, message: &Message) -> Result<Message> {
        self.check_disposed()?;
        let service = self.service_for_address(first_sender(message)?).await?;
        service.update_draft_message(id, message).await
    }

    // Backup

    /// Restores from `backup.download_uri`, if configured.
    pub async fn restore_from_configured_backup(&self) -> Result<bool> {
        match self.settings.backup.download_uri.as_deref() {
            Some(uri) => {
                let uri = Url::parse(uri)
                    .map_err(|e| CoreError::InvalidArgument(format!("Invalid backup URI {}: {}", uri, e)))?;
                self.restore_from_backup_if_needed(&uri).await
            }
            None => Ok(false),
        }
    }

    /// Downloads and applies the backup when storage holds no accounts and
    /// the seed phrase is initialized. Returns whether a backup was applied.
    pub async fn restore_from_backup_if_needed(&self, download_uri: &Url) -> Result<bool> {
        self.check_disposed()?;
        let accounts = self.storage.get_accounts().await?;
        if !accounts.is_empty() || !self.security.is_seed_phrase_initialized().await? {
            return Ok(false);
        }

        let file_name = format!(
            "{}{}",
            self.backup.backup_key_fingerprint(),
            self.settings.backup.file_extension
        );
        let Some(backup) = self.backup_transfer.download(download_uri, &file_name).await? else {
            info!("No backup {} found at {}", file_name, download_uri);
            return Ok(false);
        };

        let restored = self.backup.restore_backup(backup).await?;
        self.apply_backup(restored).await?;
        Ok(true)
    }

    async fn apply_backup(&self, restored: RestoredBackup) -> Result<()> {
        info!(
            "Restoring {} account(s) and messages of {} account(s)",
            restored.accounts.len(),
            restored.messages.len()
        );

        for account in restored.accounts {
            if self.storage.exists_account_with_email_address(&account.email).await? {
                self.update_account(account).await?;
            } else {
                self.add_account_to_storage(account).await?;
            }
        }

        for (email, containers) in restored.messages {
            if !self.storage.exists_account_with_email_address(&email).await? {
                continue;
            }
            let account = self.storage.get_account(&email).await?;
            let service = self.directory.account_service(&account).await?;
            for container in containers {
                let Some(folder) = account
                    .folders_structure
                    .iter()
                    .find(|f| f.has_same_name(&container.folder_full_name))
                else {
                    debug!("Skipping backup messages of unknown folder {}", container.folder_full_name);
                    continue;
                };
                service.add_messages_to_storage(folder, container.messages).await?;
            }
        }
        Ok(())
    }
}

fn first_sender(message: &Message) -> Result<&EmailAddress> {
    message
        .from
        .first()
        .ok_or_else(|| CoreError::InvalidArgument("Message has no sender address".into()))
}

/// Groups messages by folder, keeping first-appearance order.
fn group_by_folder(messages: &[Message]) -> Vec<(Folder, Vec<Message>)> {
    let mut groups: Vec<(Folder, Vec<Message>)> = Vec::new();
    for message in messages {
        match groups.iter_mut().find(|(folder, _)| folder == &message.folder) {
            Some((_, batch)) => batch.push(message.clone()),
            None => groups.push((message.folder.clone(), vec![message.clone()])),
        }
    }
    groups
}
