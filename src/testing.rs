// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory collaborators for tests and the demo binary.
//!
//! `MemoryStorage` is a complete `DataStorage`. The `Fake*` types stand in
//! for the backend, security and backup layers and expose knobs to script
//! their behavior and counters to inspect it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Settings;
use crate::error::{CoreError, Result};
use crate::external::account_service::{AccountService, AccountServiceContext, AccountServiceFactory};
use crate::external::backup::{BackupManager, BackupTransfer, RestoredBackup};
use crate::external::mailbox::{MailBox, MailBoxFactory};
use crate::external::security::{MessageProtector, SecurityManager};
use crate::external::storage::DataStorage;
use crate::models::{
    Account, AccountGroup, Contact, ContactAvatar, EmailAddress, Folder, MailProtocol, Message,
    StoredSettings,
};
use crate::services::credentials::{CredentialsManager, CredentialsProvider, TokenPair, TokenResolver};
use crate::services::directory::AccountDirectory;
use crate::services::events::{EventHub, MailEvent};
use crate::services::mail_core::{MailCore, MailCoreDependencies};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// --- Storage ---

#[derive(Default)]
struct StorageState {
    accounts: Vec<Account>,
    groups: Vec<AccountGroup>,
    contacts: Vec<Contact>,
    messages: Vec<Message>,
    deleted_folders: Vec<(EmailAddress, String)>,
    settings: StoredSettings,
}

#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<StorageState>,
    events: Mutex<Option<EventHub>>,
    fail_account_reads: AtomicBool,
    account_updates: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `get_account` fail with a storage error.
    pub fn fail_account_reads(&self, fail: bool) {
        self.fail_account_reads.store(fail, Ordering::SeqCst);
    }

    pub fn account_update_count(&self) -> usize {
        self.account_updates.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn deleted_folders(&self) -> Vec<(EmailAddress, String)> {
        lock(&self.state).deleted_folders.clone()
    }

    pub fn insert_group(&self, group: AccountGroup) {
        let mut state = lock(&self.state);
        state.groups.retain(|g| g.id != group.id);
        state.groups.push(group);
    }

    /// Stores a contact and announces it, the way a storage that learns
    /// contacts from incoming mail would.
    pub fn add_contact(&self, contact: Contact) {
        {
            let mut state = lock(&self.state);
            state.contacts.retain(|c| c.email != contact.email);
            state.contacts.push(contact.clone());
        }
        if let Some(events) = lock(&self.events).as_ref() {
            events.publish_contact_added(contact);
        }
    }

    pub fn insert_messages(&self, messages: Vec<Message>) {
        let mut state = lock(&self.state);
        for message in messages {
            upsert_message(&mut state.messages, message);
        }
    }

    pub fn messages_in(&self, folder: &Folder) -> Vec<Message> {
        lock(&self.state)
            .messages
            .iter()
            .filter(|m| &m.folder == folder)
            .cloned()
            .collect()
    }

    pub fn message_count(&self) -> usize {
        lock(&self.state).messages.len()
    }
}

fn upsert_message(messages: &mut Vec<Message>, message: Message) {
    match messages
        .iter_mut()
        .find(|m| m.folder == message.folder && m.id == message.id)
    {
        Some(existing) => *existing = message,
        None => messages.push(message),
    }
}

/// Newest-first page of `candidates` strictly older than `last`.
fn earlier_page<'a>(
    candidates: impl Iterator<Item = &'a Message>,
    count: usize,
    last: Option<&Message>,
) -> Vec<Message> {
    let cursor = last.map(Message::page_key);
    let mut page: Vec<Message> = candidates
        .filter(|m| cursor.as_ref().map_or(true, |c| &m.page_key() < c))
        .cloned()
        .collect();
    page.sort_by(|a, b| b.page_key().cmp(&a.page_key()));
    page.truncate(count);
    page
}

fn contact_not_found(email: &EmailAddress) -> CoreError {
    CoreError::Storage(format!("Contact {} not found", email))
}

#[async_trait]
impl DataStorage for MemoryStorage {
    async fn exists_account_with_email_address(&self, email: &EmailAddress) -> Result<bool> {
        Ok(lock(&self.state).accounts.iter().any(|a| &a.email == email))
    }

    async fn get_account(&self, email: &EmailAddress) -> Result<Account> {
        if self.fail_account_reads.load(Ordering::SeqCst) {
            return Err(CoreError::Storage("account table unavailable".into()));
        }
        lock(&self.state)
            .accounts
            .iter()
            .find(|a| &a.email == email)
            .cloned()
            .ok_or_else(|| CoreError::AccountNotFound(email.clone()))
    }

    async fn get_accounts(&self) -> Result<Vec<Account>> {
        Ok(lock(&self.state).accounts.clone())
    }

    async fn add_account(&self, account: &Account) -> Result<()> {
        let mut state = lock(&self.state);
        if state.accounts.iter().any(|a| a.email == account.email) {
            return Err(CoreError::AccountAlreadyExists(account.email.clone()));
        }
        state.accounts.push(account.clone());
        Ok(())
    }

    async fn update_account(&self, account: &Account) -> Result<()> {
        let mut state = lock(&self.state);
        let existing = state
            .accounts
            .iter_mut()
            .find(|a| a.email == account.email)
            .ok_or_else(|| CoreError::AccountNotFound(account.email.clone()))?;
        *existing = account.clone();
        self.account_updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_account(&self, account: &Account) -> Result<()> {
        lock(&self.state).accounts.retain(|a| a.email != account.email);
        Ok(())
    }

    async fn get_account_groups(&self) -> Result<Vec<AccountGroup>> {
        Ok(lock(&self.state).groups.clone())
    }

    async fn add_account_group(&self, name: &str) -> Result<AccountGroup> {
        let mut state = lock(&self.state);
        let id = state.groups.iter().map(|g| g.id).max().unwrap_or(0) + 1;
        let group = AccountGroup {
            id,
            name: name.to_string(),
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    async fn delete_folder(&self, email: &EmailAddress, full_name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state
            .messages
            .retain(|m| !(&m.folder.account_email == email && m.folder.has_same_name(full_name)));
        state.deleted_folders.push((email.clone(), full_name.to_string()));
        Ok(())
    }

    async fn get_contacts(&self) -> Result<Vec<Contact>> {
        Ok(lock(&self.state).contacts.clone())
    }

    async fn get_contact(&self, email: &EmailAddress) -> Result<Contact> {
        lock(&self.state)
            .contacts
            .iter()
            .find(|c| &c.email == email)
            .cloned()
            .ok_or_else(|| contact_not_found(email))
    }

    async fn exists_contact_with_email_address(&self, email: &EmailAddress) -> Result<bool> {
        Ok(lock(&self.state).contacts.iter().any(|c| &c.email == email))
    }

    async fn set_contact_avatar(&self, email: &EmailAddress, avatar: ContactAvatar) -> Result<()> {
        let mut state = lock(&self.state);
        let contact = state
            .contacts
            .iter_mut()
            .find(|c| &c.email == email)
            .ok_or_else(|| contact_not_found(email))?;
        contact.avatar = Some(avatar);
        Ok(())
    }

    async fn remove_contact(&self, email: &EmailAddress) -> Result<()> {
        lock(&self.state).contacts.retain(|c| &c.email != email);
        Ok(())
    }

    async fn add_messages(&self, folder: &Folder, messages: &[Message]) -> Result<()> {
        let mut state = lock(&self.state);
        for message in messages {
            let mut message = message.clone();
            message.folder = folder.clone();
            upsert_message(&mut state.messages, message);
        }
        Ok(())
    }

    async fn get_earlier_messages_in_folders(
        &self,
        folders: &[Folder],
        count: usize,
        last: Option<&Message>,
    ) -> Result<Vec<Message>> {
        let state = lock(&self.state);
        Ok(earlier_page(
            state.messages.iter().filter(|m| folders.contains(&m.folder)),
            count,
            last,
        ))
    }

    async fn get_earlier_contact_messages(
        &self,
        contact: &EmailAddress,
        count: usize,
        last: Option<&Message>,
    ) -> Result<Vec<Message>> {
        let state = lock(&self.state);
        Ok(earlier_page(
            state
                .messages
                .iter()
                .filter(|m| m.from.contains(contact) || m.to.contains(contact)),
            count,
            last,
        ))
    }

    async fn get_unread_messages_count_by_contact(&self) -> Result<Vec<(EmailAddress, usize)>> {
        let state = lock(&self.state);
        let mut counts: Vec<(EmailAddress, usize)> = Vec::new();
        for message in state.messages.iter().filter(|m| !m.is_read) {
            for sender in &message.from {
                match counts.iter_mut().find(|(email, _)| email == sender) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((sender.clone(), 1)),
                }
            }
        }
        Ok(counts)
    }

    async fn get_settings(&self) -> Result<StoredSettings> {
        Ok(lock(&self.state).settings.clone())
    }

    async fn set_settings(&self, settings: &StoredSettings) -> Result<()> {
        lock(&self.state).settings = settings.clone();
        Ok(())
    }

    fn attach_event_hub(&self, events: EventHub) {
        *lock(&self.events) = Some(events);
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// --- Backend ---

/// Script shared by every service a [`FakeAccountServiceFactory`] creates.
#[derive(Default)]
pub struct FakeBehavior {
    new_messages: Mutex<HashMap<Folder, Vec<Message>>>,
    remote_earlier: Mutex<HashMap<Folder, Vec<Message>>>,
    folder_failures: Mutex<HashMap<Folder, CoreError>>,
    folder_delays: Mutex<HashMap<Folder, Duration>>,
    structure_failures: Mutex<HashMap<EmailAddress, CoreError>>,
    synchronize_calls: Mutex<HashMap<EmailAddress, usize>>,
    earlier_pulls: Mutex<HashMap<Folder, usize>>,
    unread: Mutex<HashMap<EmailAddress, usize>>,
    commands: Mutex<Vec<(EmailAddress, &'static str, Vec<u32>)>>,
    sent: Mutex<Vec<(EmailAddress, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_draft_id: AtomicU32,
}

impl FakeBehavior {
    /// Messages handed out by the next receive of `folder`.
    pub fn push_new_messages(&self, folder: &Folder, messages: Vec<Message>) {
        lock(&self.new_messages)
            .entry(folder.clone())
            .or_default()
            .extend(messages);
    }

    /// Older messages the backend holds for `folder` beyond storage.
    pub fn push_remote_earlier(&self, folder: &Folder, messages: Vec<Message>) {
        lock(&self.remote_earlier)
            .entry(folder.clone())
            .or_default()
            .extend(messages);
    }

    pub fn fail_folder(&self, folder: &Folder, error: CoreError) {
        lock(&self.folder_failures).insert(folder.clone(), error);
    }

    pub fn heal_folder(&self, folder: &Folder) {
        lock(&self.folder_failures).remove(folder);
    }

    pub fn set_folder_delay(&self, folder: &Folder, delay: Duration) {
        lock(&self.folder_delays).insert(folder.clone(), delay);
    }

    pub fn fail_structure(&self, email: &EmailAddress, error: CoreError) {
        lock(&self.structure_failures).insert(email.clone(), error);
    }

    pub fn set_unread(&self, email: &EmailAddress, count: usize) {
        lock(&self.unread).insert(email.clone(), count);
    }

    pub fn synchronize_calls(&self, email: &EmailAddress) -> usize {
        lock(&self.synchronize_calls).get(email).copied().unwrap_or(0)
    }

    /// Calls to `receive_earlier_messages` for `folder`.
    pub fn earlier_pulls(&self, folder: &Folder) -> usize {
        lock(&self.earlier_pulls).get(folder).copied().unwrap_or(0)
    }

    /// Highest number of receives ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// `(account, command, message ids)` in call order.
    pub fn commands(&self) -> Vec<(EmailAddress, &'static str, Vec<u32>)> {
        lock(&self.commands).clone()
    }

    /// `(sending account, subject)` in call order.
    pub fn sent(&self) -> Vec<(EmailAddress, String)> {
        lock(&self.sent).clone()
    }

    async fn enter_folder(&self, folder: &Folder, cancel: &CancellationToken) -> Result<()> {
        let delay = lock(&self.folder_delays).get(folder).copied();
        if let Some(delay) = delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            }
        }
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        match lock(&self.folder_failures).get(folder) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn record(&self, email: &EmailAddress, command: &'static str, messages: &[Message]) {
        lock(&self.commands).push((email.clone(), command, messages.iter().map(|m| m.id).collect()));
    }
}

struct InFlight<'a>(&'a FakeBehavior);

impl<'a> InFlight<'a> {
    fn enter(behavior: &'a FakeBehavior) -> Self {
        let now = behavior.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        behavior.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(behavior)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeAccountService {
    email: EmailAddress,
    storage: Arc<dyn DataStorage>,
    mailbox: Arc<dyn MailBox>,
    events: EventHub,
    behavior: Arc<FakeBehavior>,
}

#[async_trait]
impl AccountService for FakeAccountService {
    fn email(&self) -> &EmailAddress {
        &self.email
    }

    async fn update_folder_structure(&self, cancel: &CancellationToken) -> Result<Vec<Folder>> {
        if let Some(error) = lock(&self.behavior.structure_failures).get(&self.email) {
            return Err(error.clone());
        }
        self.mailbox.get_folders_structure(cancel).await
    }

    async fn receive_new_messages_in_folder(
        &self,
        folder: &Folder,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        let _in_flight = InFlight::enter(&self.behavior);
        self.behavior.enter_folder(folder, cancel).await?;

        let messages = lock(&self.behavior.new_messages)
            .remove(folder)
            .unwrap_or_default();
        self.storage.add_messages(folder, &messages).await?;
        Ok(messages)
    }

    async fn receive_earlier_messages(
        &self,
        folder: &Folder,
        count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        *lock(&self.behavior.earlier_pulls)
            .entry(folder.clone())
            .or_default() += 1;
        self.behavior.enter_folder(folder, cancel).await?;

        let batch = {
            let mut remote = lock(&self.behavior.remote_earlier);
            let pending = remote.entry(folder.clone()).or_default();
            pending.sort_by(|a, b| b.page_key().cmp(&a.page_key()));
            let take = count.min(pending.len());
            pending.drain(..take).collect::<Vec<_>>()
        };
        self.storage.add_messages(folder, &batch).await?;
        debug!("{} earlier message(s) loaded into {}", batch.len(), folder.full_name);
        Ok(batch)
    }

    async fn synchronize(&self, _full: bool, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        *lock(&self.behavior.synchronize_calls)
            .entry(self.email.clone())
            .or_default() += 1;
        Ok(())
    }

    async fn get_unread_messages_count(&self) -> Result<usize> {
        Ok(lock(&self.behavior.unread).get(&self.email).copied().unwrap_or(0))
    }

    async fn delete_messages(&self, folder: &Folder, messages: &[Message]) -> Result<()> {
        self.behavior.record(&self.email, "delete", messages);
        for message in messages {
            self.events.publish(MailEvent::MessageDeleted {
                email: self.email.clone(),
                folder: folder.clone(),
                message_id: message.id,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    async fn mark_messages_as_read(&self, messages: &[Message]) -> Result<()> {
        self.behavior.record(&self.email, "read", messages);
        self.events.publish(MailEvent::MessagesIsReadChanged {
            messages: with_flag(messages, |m| m.is_read = true),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn mark_messages_as_unread(&self, messages: &[Message]) -> Result<()> {
        self.behavior.record(&self.email, "unread", messages);
        self.events.publish(MailEvent::MessagesIsReadChanged {
            messages: with_flag(messages, |m| m.is_read = false),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn flag_messages(&self, messages: &[Message]) -> Result<()> {
        self.behavior.record(&self.email, "flag", messages);
        self.events.publish(MailEvent::MessagesIsFlaggedChanged {
            messages: with_flag(messages, |m| m.is_flagged = true),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn unflag_messages(&self, messages: &[Message]) -> Result<()> {
        self.behavior.record(&self.email, "unflag", messages);
        self.events.publish(MailEvent::MessagesIsFlaggedChanged {
            messages: with_flag(messages, |m| m.is_flagged = false),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn get_message_body(&self, message: &Message) -> Result<Message> {
        let mut message = message.clone();
        message.text_body = Some(format!("Body of message {}", message.id));
        Ok(message)
    }

    async fn send_message(&self, message: &Message, _encrypt: bool, _sign: bool) -> Result<()> {
        lock(&self.behavior.sent).push((self.email.clone(), message.subject.clone()));
        Ok(())
    }

    async fn create_draft_message(&self, message: &Message) -> Result<Message> {
        let mut draft = message.clone();
        draft.id = self.behavior.next_draft_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(draft)
    }

    async fn update_draft_message(&self, id: u32, message: &Message) -> Result<Message> {
        let mut draft = message.clone();
        draft.id = id;
        Ok(draft)
    }

    async fn add_messages_to_storage(&self, folder: &Folder, messages: Vec<Message>) -> Result<()> {
        self.storage.add_messages(folder, &messages).await
    }
}

fn with_flag(messages: &[Message], apply: impl Fn(&mut Message)) -> Vec<Message> {
    messages
        .iter()
        .cloned()
        .map(|mut m| {
            apply(&mut m);
            m
        })
        .collect()
}

#[derive(Default)]
pub struct FakeAccountServiceFactory {
    behavior: Arc<FakeBehavior>,
    created: AtomicUsize,
}

impl FakeAccountServiceFactory {
    pub fn behavior(&self) -> Arc<FakeBehavior> {
        Arc::clone(&self.behavior)
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl AccountServiceFactory for FakeAccountServiceFactory {
    fn create_account_service(&self, context: AccountServiceContext) -> Arc<dyn AccountService> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeAccountService {
            email: context.account.email.clone(),
            storage: context.storage,
            mailbox: context.mailbox,
            events: context.events,
            behavior: Arc::clone(&self.behavior),
        })
    }
}

struct FakeMailBox {
    folders: Vec<Folder>,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    failure: Option<CoreError>,
}

#[async_trait]
impl MailBox for FakeMailBox {
    async fn get_folders_structure(&self, cancel: &CancellationToken) -> Result<Vec<Folder>> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        if let Some(credentials) = &self.credentials {
            credentials.get_credentials(&HashSet::new(), cancel).await?;
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.folders.clone()),
        }
    }
}

/// Mailboxes report the account's stored folders, or `INBOX` and `Sent`
/// for an account that has none yet.
#[derive(Default)]
pub struct FakeMailBoxFactory {
    failure: Mutex<Option<CoreError>>,
    created: AtomicUsize,
    server_failures: Mutex<HashMap<String, CoreError>>,
    server_tests: Mutex<Vec<(String, u16, MailProtocol)>>,
}

impl FakeMailBoxFactory {
    /// Makes every later mailbox fail its folder listing.
    pub fn fail_with(&self, error: Option<CoreError>) {
        *lock(&self.failure) = error;
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Makes server tests against `server_address` fail with `error`.
    pub fn fail_server(&self, server_address: &str, error: CoreError) {
        lock(&self.server_failures).insert(server_address.to_string(), error);
    }

    /// `(address, port, protocol)` of every server test, in call order.
    pub fn server_tests(&self) -> Vec<(String, u16, MailProtocol)> {
        lock(&self.server_tests).clone()
    }
}

#[async_trait]
impl MailBoxFactory for FakeMailBoxFactory {
    fn create_mailbox(
        &self,
        account: &Account,
        credentials: Option<Arc<dyn CredentialsProvider>>,
    ) -> Result<Arc<dyn MailBox>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let folders = if account.folders_structure.is_empty() {
            vec![
                Folder::new("INBOX", account.email.clone(), true),
                Folder::new("Sent", account.email.clone(), false),
            ]
        } else {
            account.folders_structure.clone()
        };
        Ok(Arc::new(FakeMailBox {
            folders,
            credentials,
            failure: lock(&self.failure).clone(),
        }))
    }

    async fn test_mail_server(
        &self,
        server_address: &str,
        server_port: u16,
        protocol: MailProtocol,
        credentials: Arc<dyn CredentialsProvider>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        lock(&self.server_tests).push((server_address.to_string(), server_port, protocol));
        let failure = lock(&self.server_failures).get(server_address).cloned();
        if let Some(error) = failure {
            return Err(error);
        }
        credentials.get_credentials(&HashSet::new(), cancel).await?;
        Ok(())
    }
}

// --- Security and backup ---

pub struct NoopProtector;

#[async_trait]
impl MessageProtector for NoopProtector {
    async fn protect(&self, message: Message, _encrypt: bool, _sign: bool) -> Result<Message> {
        Ok(message)
    }

    async fn unprotect(&self, message: Message) -> Result<Message> {
        Ok(message)
    }
}

/// Accepts any password until one is set. Keys are derived from their
/// input, so they are stable across runs.
#[derive(Default)]
pub struct FakeSecurityManager {
    password: Mutex<Option<String>>,
    started: AtomicBool,
    seed_initialized: AtomicBool,
    resets: AtomicUsize,
    pgp_keys: Mutex<Vec<EmailAddress>>,
}

impl FakeSecurityManager {
    pub fn set_password(&self, password: &str) {
        *lock(&self.password) = Some(password.to_string());
    }

    pub fn set_seed_initialized(&self, initialized: bool) {
        self.seed_initialized.store(initialized, Ordering::SeqCst);
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn pgp_keys(&self) -> Vec<EmailAddress> {
        lock(&self.pgp_keys).clone()
    }

    fn check_password(&self, candidate: &str) -> Result<()> {
        match lock(&self.password).as_deref() {
            Some(expected) if expected != candidate => Err(CoreError::InvalidPassword),
            _ => Ok(()),
        }
    }
}

fn address_safe(prefix: &str, input: &str) -> String {
    let body: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    format!("{}{}", prefix, body)
}

#[async_trait]
impl SecurityManager for FakeSecurityManager {
    async fn start(&self, password: &str) -> Result<()> {
        self.check_password(password)?;
        if lock(&self.password).is_none() {
            self.set_password(password);
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        *lock(&self.password) = None;
        self.started.store(false, Ordering::SeqCst);
        self.seed_initialized.store(false, Ordering::SeqCst);
        lock(&self.pgp_keys).clear();
        Ok(())
    }

    async fn is_never_started(&self) -> Result<bool> {
        Ok(!self.started.load(Ordering::SeqCst) && lock(&self.password).is_none())
    }

    async fn change_password(&self, current: &str, new: &str) -> Result<()> {
        self.check_password(current)?;
        self.set_password(new);
        Ok(())
    }

    async fn is_seed_phrase_initialized(&self) -> Result<bool> {
        Ok(self.seed_initialized.load(Ordering::SeqCst))
    }

    fn message_protector(&self) -> Arc<dyn MessageProtector> {
        Arc::new(NoopProtector)
    }

    async fn create_default_pgp_keys(&self, account: &Account) -> Result<()> {
        lock(&self.pgp_keys).push(account.email.clone());
        Ok(())
    }

    async fn email_public_key(&self, email: &EmailAddress) -> Result<String> {
        Ok(address_safe("pk", email.address()))
    }

    async fn derive_decentralized_key(&self, tag: &str) -> Result<String> {
        Ok(address_safe("dk", tag))
    }
}

#[derive(Default)]
pub struct FakeBackupManager {
    restored: Mutex<RestoredBackup>,
    received: Mutex<Vec<Vec<u8>>>,
}

impl FakeBackupManager {
    pub const FINGERPRINT: &'static str = "0123456789ABCDEF";

    /// What a later restore produces, whatever the bytes.
    pub fn set_restored(&self, restored: RestoredBackup) {
        *lock(&self.restored) = restored;
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        lock(&self.received).clone()
    }
}

#[async_trait]
impl BackupManager for FakeBackupManager {
    fn backup_key_fingerprint(&self) -> String {
        Self::FINGERPRINT.to_string()
    }

    async fn restore_backup(&self, backup: Vec<u8>) -> Result<RestoredBackup> {
        lock(&self.received).push(backup);
        Ok(lock(&self.restored).clone())
    }
}

#[derive(Default)]
pub struct FakeBackupTransfer {
    files: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<(Url, String)>>,
}

impl FakeBackupTransfer {
    pub fn put(&self, file_name: &str, bytes: Vec<u8>) {
        lock(&self.files).insert(file_name.to_string(), bytes);
    }

    pub fn requests(&self) -> Vec<(Url, String)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl BackupTransfer for FakeBackupTransfer {
    async fn download(&self, uri: &Url, file_name: &str) -> Result<Option<Vec<u8>>> {
        lock(&self.requests).push((uri.clone(), file_name.to_string()));
        Ok(lock(&self.files).get(file_name).cloned())
    }
}

/// Issues numbered access tokens. With rotation on, every refresh also
/// hands back a new refresh token.
#[derive(Default)]
pub struct FakeTokenResolver {
    rotate: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<Vec<(EmailAddress, String)>>,
}

impl FakeTokenResolver {
    pub fn rotating() -> Self {
        let resolver = Self::default();
        resolver.rotate.store(true, Ordering::SeqCst);
        resolver
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(account, auth assistant id)` of every request, in call order.
    pub fn requests(&self) -> Vec<(EmailAddress, String)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl TokenResolver for FakeTokenResolver {
    async fn get_access_token(
        &self,
        email: &EmailAddress,
        auth_assistant_id: &str,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenPair> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        lock(&self.requests).push((email.clone(), auth_assistant_id.to_string()));
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let refresh_token = if self.rotate.load(Ordering::SeqCst) {
            format!("{}-r{}", refresh_token, call)
        } else {
            refresh_token.to_string()
        };
        Ok(TokenPair {
            access_token: format!("access-{}", call),
            refresh_token,
        })
    }
}

// --- Assembly ---

/// Directory over fakes, sharing `storage`, `factory` and `events`.
pub fn test_directory(
    storage: Arc<MemoryStorage>,
    factory: Arc<FakeAccountServiceFactory>,
    events: EventHub,
) -> Arc<AccountDirectory> {
    let credentials = Arc::new(CredentialsManager::new(
        storage.clone(),
        Arc::new(FakeTokenResolver::default()),
    ));
    Arc::new(AccountDirectory::new(
        storage,
        Arc::new(FakeMailBoxFactory::default()),
        factory,
        Arc::new(FakeSecurityManager::default()),
        credentials,
        events,
    ))
}

/// A [`MailCore`] wired to fakes, with handles to every fake.
pub struct TestHarness {
    pub core: Arc<MailCore>,
    pub storage: Arc<MemoryStorage>,
    pub mailboxes: Arc<FakeMailBoxFactory>,
    pub services: Arc<FakeAccountServiceFactory>,
    pub security: Arc<FakeSecurityManager>,
    pub backup: Arc<FakeBackupManager>,
    pub transfer: Arc<FakeBackupTransfer>,
    pub tokens: Arc<FakeTokenResolver>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::build(settings, FakeTokenResolver::default())
    }

    pub fn build(settings: Settings, tokens: FakeTokenResolver) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let mailboxes = Arc::new(FakeMailBoxFactory::default());
        let services = Arc::new(FakeAccountServiceFactory::default());
        let security = Arc::new(FakeSecurityManager::default());
        let backup = Arc::new(FakeBackupManager::default());
        let transfer = Arc::new(FakeBackupTransfer::default());
        let tokens = Arc::new(tokens);

        let core = MailCore::new(
            MailCoreDependencies {
                storage: storage.clone(),
                mailbox_factory: mailboxes.clone(),
                service_factory: services.clone(),
                security: security.clone(),
                backup: backup.clone(),
                backup_transfer: transfer.clone(),
                token_resolver: tokens.clone(),
            },
            settings,
        );

        Self {
            core,
            storage,
            mailboxes,
            services,
            security,
            backup,
            transfer,
            tokens,
        }
    }

    pub fn behavior(&self) -> Arc<FakeBehavior> {
        self.services.behavior()
    }

    /// Puts `account` straight into storage, bypassing the core.
    pub async fn seed_account(&self, account: Account) -> Result<()> {
        self.storage.add_account(&account).await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
