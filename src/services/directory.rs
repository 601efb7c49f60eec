// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory directory of accounts, groups and account services.
//!
//! Every map here is a cache over `DataStorage`: it may be cleared and
//! reloaded at any time. Service creation races collapse to one instance per
//! address; the losing instance is dropped before anything can reach it.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::external::account_service::{AccountService, AccountServiceContext, AccountServiceFactory};
use crate::external::mailbox::MailBoxFactory;
use crate::external::security::SecurityManager;
use crate::external::storage::DataStorage;
use crate::models::{Account, AccountGroup, EmailAddress, Folder};
use crate::services::credentials::{CredentialsManager, SharedAccount};
use crate::services::events::EventHub;

pub struct AccountDirectory {
    storage: Arc<dyn DataStorage>,
    mailbox_factory: Arc<dyn MailBoxFactory>,
    service_factory: Arc<dyn AccountServiceFactory>,
    security: Arc<dyn SecurityManager>,
    credentials: Arc<CredentialsManager>,
    events: EventHub,
    groups: DashMap<i32, AccountGroup>,
    accounts: DashMap<EmailAddress, Account>,
    services: DashMap<EmailAddress, Arc<dyn AccountService>>,
    folder_services: DashMap<Folder, Arc<dyn AccountService>>,
}

impl AccountDirectory {
    pub fn new(
        storage: Arc<dyn DataStorage>,
        mailbox_factory: Arc<dyn MailBoxFactory>,
        service_factory: Arc<dyn AccountServiceFactory>,
        security: Arc<dyn SecurityManager>,
        credentials: Arc<CredentialsManager>,
        events: EventHub,
    ) -> Self {
        Self {
            storage,
            mailbox_factory,
            service_factory,
            security,
            credentials,
            events,
            groups: DashMap::new(),
            accounts: DashMap::new(),
            services: DashMap::new(),
            folder_services: DashMap::new(),
        }
    }

    /// Reloads groups and accounts from storage, returning them in storage
    /// order. Services of accounts that no longer exist are evicted.
    pub async fn load_accounts(&self) -> Result<(Vec<Account>, Vec<AccountGroup>)> {
        let groups = self.storage.get_account_groups().await?;
        let accounts = self.storage.get_accounts().await?;

        // Upsert first, then drop the rest, so lookups never see an empty map
        for group in &groups {
            self.groups.insert(group.id, group.clone());
        }
        let group_ids: HashSet<i32> = groups.iter().map(|g| g.id).collect();
        self.groups.retain(|id, _| group_ids.contains(id));

        for account in &accounts {
            self.accounts.insert(account.email.clone(), account.clone());
        }
        let emails: HashSet<&EmailAddress> = accounts.iter().map(|a| &a.email).collect();
        self.accounts.retain(|email, _| emails.contains(email));

        let stale: Vec<EmailAddress> = self
            .services
            .iter()
            .filter(|entry| !self.accounts.contains_key(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for email in stale {
            debug!("Evicting service of unknown account {}", email);
            self.remove_account_service(&email);
        }

        debug!("Loaded {} accounts and {} groups", accounts.len(), groups.len());
        Ok((accounts, groups))
    }

    pub fn account(&self, email: &EmailAddress) -> Option<Account> {
        self.accounts.get(email).map(|entry| entry.value().clone())
    }

    pub fn upsert_account(&self, account: Account) {
        self.accounts.insert(account.email.clone(), account);
    }

    pub fn remove_account(&self, email: &EmailAddress) -> Option<Account> {
        self.accounts.remove(email).map(|(_, account)| account)
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn group(&self, id: i32) -> Option<AccountGroup> {
        self.groups.get(&id).map(|entry| entry.value().clone())
    }

    pub fn upsert_group(&self, group: AccountGroup) {
        self.groups.insert(group.id, group);
    }

    /// Replaces the cached folder structure of `email` and drops folder
    /// mappings for folders that disappeared.
    pub fn update_account_folders(&self, email: &EmailAddress, folders: Vec<Folder>) {
        if let Some(mut account) = self.accounts.get_mut(email) {
            account.set_folders_structure(folders.clone());
        }
        self.folder_services
            .retain(|folder, _| &folder.account_email != email || folders.contains(folder));
    }

    /// Service for `account`, created on first use.
    pub async fn account_service(&self, account: &Account) -> Result<Arc<dyn AccountService>> {
        if let Some(service) = self.services.get(&account.email) {
            return Ok(Arc::clone(service.value()));
        }
        self.account_service_for_record(Arc::new(Mutex::new(account.clone())))
            .await
    }

    /// Like [`AccountDirectory::account_service`], with credentials bound to a
    /// shared record that may not be stored yet.
    pub async fn account_service_for_record(
        &self,
        record: SharedAccount,
    ) -> Result<Arc<dyn AccountService>> {
        let account = record.lock().await.clone();
        if let Some(service) = self.services.get(&account.email) {
            return Ok(Arc::clone(service.value()));
        }

        let credentials = self.credentials.create_credentials_provider(record).await;
        let mailbox = self.mailbox_factory.create_mailbox(&account, credentials)?;
        let email = account.email.clone();
        let candidate = self.service_factory.create_account_service(AccountServiceContext {
            account,
            storage: Arc::clone(&self.storage),
            mailbox,
            protector: self.security.message_protector(),
            events: self.events.clone(),
        });

        let winner = Arc::clone(self.services.entry(email.clone()).or_insert(candidate).value());
        debug!("Account service ready for {}", email);
        Ok(winner)
    }

    /// Cached service of `email`, falling back to the cached account record.
    pub async fn service_by_email(&self, email: &EmailAddress) -> Result<Option<Arc<dyn AccountService>>> {
        if let Some(service) = self.services.get(email) {
            return Ok(Some(Arc::clone(service.value())));
        }
        match self.account(email) {
            Some(account) => self.account_service(&account).await.map(Some),
            None => Ok(None),
        }
    }

    /// Service owning `folder`; `None` when its account is gone.
    pub async fn service_for_folder(&self, folder: &Folder) -> Result<Option<Arc<dyn AccountService>>> {
        if let Some(service) = self.folder_services.get(folder) {
            return Ok(Some(Arc::clone(service.value())));
        }
        let Some(service) = self.service_by_email(&folder.account_email).await? else {
            return Ok(None);
        };
        Ok(Some(self.map_folder(folder, service)))
    }

    pub fn map_folder(&self, folder: &Folder, service: Arc<dyn AccountService>) -> Arc<dyn AccountService> {
        Arc::clone(self.folder_services.entry(folder.clone()).or_insert(service).value())
    }

    pub fn remove_account_service(&self, email: &EmailAddress) {
        if self.services.remove(email).is_some() {
            info!("Removed account service for {}", email);
        }
        self.folder_services.retain(|folder, _| &folder.account_email != email);
    }

    pub fn has_account_service(&self, email: &EmailAddress) -> bool {
        self.services.contains_key(email)
    }

    pub fn folder_mapping_count(&self, email: &EmailAddress) -> usize {
        self.folder_services
            .iter()
            .filter(|entry| &entry.key().account_email == email)
            .count()
    }

    pub fn clear(&self) {
        self.folder_services.clear();
        self.services.clear();
        self.accounts.clear();
        self.groups.clear();
    }
}
