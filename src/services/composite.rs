// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Composite folders and accounts: virtual views over same-named folders of
//! several physical accounts, rebuilt on demand from the directory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};
use crate::external::account_service::AccountService;
use crate::models::{Account, AccountGroup, EmailAddress, Folder, Message, NO_GROUP};
use crate::services::directory::AccountDirectory;

/// Aggregate over folders sharing one case-insensitive name.
///
/// Operations fan out to every member concurrently and merge results in
/// member order, whatever order the members complete in. A failing member is
/// logged and skipped; the call only fails when every member failed, or with
/// `Cancelled` as soon as any member was cancelled.
#[derive(Clone)]
pub struct CompositeFolder {
    folders: Vec<Folder>,
    directory: Arc<AccountDirectory>,
}

impl CompositeFolder {
    pub fn new(folders: Vec<Folder>, directory: Arc<AccountDirectory>) -> Self {
        Self { folders, directory }
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    pub fn full_name(&self) -> Option<&str> {
        self.folders.first().map(|f| f.full_name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    pub fn contains(&self, folder: &Folder) -> bool {
        self.folders.contains(folder)
    }

    /// Members whose account still has a service, in member order.
    async fn members(&self) -> Result<Vec<(&Folder, Arc<dyn AccountService>)>> {
        let mut members = Vec::with_capacity(self.folders.len());
        for folder in &self.folders {
            match self.directory.service_for_folder(folder).await? {
                Some(service) => members.push((folder, service)),
                None => debug!("Skipping folder {} of unknown account {}", folder.full_name, folder.account_email),
            }
        }
        Ok(members)
    }

    /// One service per distinct member account, in first-member order.
    async fn accounts(&self) -> Result<Vec<Arc<dyn AccountService>>> {
        let mut seen = HashSet::new();
        Ok(self
            .members()
            .await?
            .into_iter()
            .filter(|(folder, _)| seen.insert(folder.account_email.clone()))
            .map(|(_, service)| service)
            .collect())
    }

    pub async fn receive_new_messages(&self, cancel: &CancellationToken) -> Result<Vec<Message>> {
        let members = self.members().await?;
        let results = join_all(
            members
                .iter()
                .map(|(folder, service)| service.receive_new_messages_in_folder(folder, cancel)),
        )
        .await;
        merge_results(labels(&members), results)
    }

    pub async fn receive_earlier_messages(&self, count: usize, cancel: &CancellationToken) -> Result<Vec<Message>> {
        let members = self.members().await?;
        let results = join_all(
            members
                .iter()
                .map(|(folder, service)| service.receive_earlier_messages(folder, count, cancel)),
        )
        .await;
        merge_results(labels(&members), results)
    }

    pub async fn update_folder_structure(&self, cancel: &CancellationToken) -> Result<()> {
        let services = self.accounts().await?;
        let results = join_all(services.iter().map(|service| async move {
            let folders = service.update_folder_structure(cancel).await?;
            self.directory.update_account_folders(service.email(), folders);
            Ok::<_, CoreError>(Vec::<()>::new())
        }))
        .await;
        merge_results(account_labels(&services), results).map(|_| ())
    }

    pub async fn synchronize(&self, full: bool, cancel: &CancellationToken) -> Result<()> {
        let services = self.accounts().await?;
        let results = join_all(services.iter().map(|service| async move {
            service.synchronize(full, cancel).await.map(|()| Vec::<()>::new())
        }))
        .await;
        merge_results(account_labels(&services), results).map(|_| ())
    }
}

fn labels(members: &[(&Folder, Arc<dyn AccountService>)]) -> Vec<String> {
    members
        .iter()
        .map(|(folder, _)| format!("{}/{}", folder.account_email, folder.full_name))
        .collect()
}

fn account_labels(services: &[Arc<dyn AccountService>]) -> Vec<String> {
    services.iter().map(|s| s.email().to_string()).collect()
}

fn merge_results<T>(labels: Vec<String>, results: Vec<Result<Vec<T>>>) -> Result<Vec<T>> {
    let total = results.len();
    let mut merged = Vec::new();
    let mut first_error = None;
    let mut failed = 0;

    for (label, result) in labels.into_iter().zip(results) {
        match result {
            Ok(items) => merged.extend(items),
            Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
            Err(e) => {
                warn!("Composite member {} failed: {}", label, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if failed == total => Err(e),
        _ => Ok(merged),
    }
}

/// One logical identity: a single ungrouped account or all loaded members of
/// one account group.
#[derive(Clone)]
pub struct CompositeAccount {
    email: EmailAddress,
    addresses: Vec<EmailAddress>,
    folders: Vec<CompositeFolder>,
    default_inbox: CompositeFolder,
    group: Option<AccountGroup>,
}

impl CompositeAccount {
    /// Address of the first member.
    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    pub fn addresses(&self) -> &[EmailAddress] {
        &self.addresses
    }

    pub fn folders(&self) -> &[CompositeFolder] {
        &self.folders
    }

    pub fn default_inbox(&self) -> &CompositeFolder {
        &self.default_inbox
    }

    pub fn group(&self) -> Option<&AccountGroup> {
        self.group.as_ref()
    }

    pub fn folder_by_name(&self, full_name: &str) -> Option<&CompositeFolder> {
        self.folders
            .iter()
            .find(|f| f.folders.first().is_some_and(|first| first.has_same_name(full_name)))
    }
}

/// Builds composite accounts from `accounts` in storage order.
///
/// Group ids are visited in order of first appearance. Every account with
/// `NO_GROUP` becomes its own composite account. Accounts sharing a group in
/// `groups` are merged into one; accounts of an unknown group are skipped.
/// Folder names merge case-insensitively, keeping first-appearance order.
/// Each folder is mapped to its account's service on the way.
pub async fn build_composite_accounts(
    directory: &Arc<AccountDirectory>,
    accounts: &[Account],
    groups: &[AccountGroup],
) -> Result<Vec<CompositeAccount>> {
    let known: HashMap<i32, &AccountGroup> = groups.iter().map(|g| (g.id, g)).collect();

    let mut order = Vec::new();
    let mut by_group: HashMap<i32, Vec<&Account>> = HashMap::new();
    for account in accounts {
        by_group
            .entry(account.group_id)
            .or_insert_with(|| {
                order.push(account.group_id);
                Vec::new()
            })
            .push(account);
    }

    let mut result = Vec::new();
    for group_id in order {
        let members = by_group.remove(&group_id).unwrap_or_default();
        if group_id == NO_GROUP {
            for account in members {
                result.push(merge_members(directory, &[account], None).await?);
            }
            continue;
        }

        match known.get(&group_id) {
            Some(group) => result.push(merge_members(directory, &members, Some((*group).clone())).await?),
            None => debug!("Skipping {} account(s) of unknown group {}", members.len(), group_id),
        }
    }
    Ok(result)
}

async fn merge_members(
    directory: &Arc<AccountDirectory>,
    members: &[&Account],
    group: Option<AccountGroup>,
) -> Result<CompositeAccount> {
    let mut addresses = Vec::with_capacity(members.len());
    let mut names: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Vec<Folder>> = Vec::new();
    let mut inboxes = Vec::new();

    for account in members {
        let service = directory.account_service(account).await?;
        addresses.push(account.email.clone());

        for folder in &account.folders_structure {
            directory.map_folder(folder, Arc::clone(&service));
            match names.get(&folder.name_key()) {
                Some(&index) => merged[index].push(folder.clone()),
                None => {
                    names.insert(folder.name_key(), merged.len());
                    merged.push(vec![folder.clone()]);
                }
            }
            if account.default_inbox_folder.as_ref() == Some(folder) {
                inboxes.push(folder.clone());
            }
        }
    }

    let email = addresses
        .first()
        .cloned()
        .ok_or_else(|| CoreError::InvalidArgument("Composite account without members".into()))?;

    Ok(CompositeAccount {
        email,
        addresses,
        folders: merged
            .into_iter()
            .map(|folders| CompositeFolder::new(folders, Arc::clone(directory)))
            .collect(),
        default_inbox: CompositeFolder::new(inboxes, Arc::clone(directory)),
        group,
    })
}

/// Inbox folders of every account, as one composite folder.
pub async fn all_accounts_inbox(directory: &Arc<AccountDirectory>, accounts: &[Account]) -> Result<CompositeFolder> {
    let mut folders = Vec::new();
    for account in accounts {
        let service = directory.account_service(account).await?;
        for folder in account.folders_structure.iter().filter(|f| f.is_inbox) {
            directory.map_folder(folder, Arc::clone(&service));
            folders.push(folder.clone());
        }
    }
    Ok(CompositeFolder::new(folders, Arc::clone(directory)))
}
