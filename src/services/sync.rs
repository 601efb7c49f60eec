// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synchronization passes: folder refresh, new-message fetch and storage
//! reconciliation for one account, plus the single-flight manual checks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::error::{CoreError, FolderFailure, Result};
use crate::external::account_service::AccountService;
use crate::models::{EmailAddress, Folder, ReceivedMessageInfo};
use crate::services::composite::CompositeFolder;
use crate::services::directory::AccountDirectory;
use crate::services::events::EventHub;

/// Bounded record of every failure absorbed by a pass, published or not.
pub struct FailureLog {
    entries: Mutex<VecDeque<FolderFailure>>,
    capacity: usize,
}

impl FailureLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, failure: FolderFailure) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.push_back(failure);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<FolderFailure> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

/// Outcome of one pass over one account.
#[derive(Debug, Default, Clone)]
pub struct PassReport {
    pub received: Vec<ReceivedMessageInfo>,
    pub failures: Vec<FolderFailure>,
    pub cancelled: bool,
    pub connection_lost: bool,
}

/// Resets the manual-check flag when the check ends, however it ends.
struct ManualCheckGuard<'a>(&'a AtomicBool);

impl<'a> ManualCheckGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ManualCheckGuard(flag))
    }
}

impl Drop for ManualCheckGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncEngine {
    directory: Arc<AccountDirectory>,
    events: EventHub,
    config: SyncConfig,
    failures: Arc<FailureLog>,
    pass_gates: DashMap<EmailAddress, Arc<tokio::sync::Mutex<()>>>,
    // Every pass holds a read guard; shutdown takes the write side.
    running: RwLock<()>,
    closed: AtomicBool,
    manual_check: AtomicBool,
    passes_started: AtomicU64,
}

impl SyncEngine {
    pub fn new(directory: Arc<AccountDirectory>, events: EventHub, config: SyncConfig) -> Self {
        let failures = Arc::new(FailureLog::new(config.failure_history_size));
        Self {
            directory,
            events,
            config,
            failures,
            pass_gates: DashMap::new(),
            running: RwLock::new(()),
            closed: AtomicBool::new(false),
            manual_check: AtomicBool::new(false),
            passes_started: AtomicU64::new(0),
        }
    }

    pub fn failures(&self) -> Arc<FailureLog> {
        Arc::clone(&self.failures)
    }

    pub fn passes_started(&self) -> u64 {
        self.passes_started.load(Ordering::SeqCst)
    }

    pub fn is_manual_check_running(&self) -> bool {
        self.manual_check.load(Ordering::SeqCst)
    }

    /// Waits for a running pass of `email`, then drops its gate.
    pub async fn forget_account(&self, email: &EmailAddress) {
        let gate = self.pass_gates.get(email).map(|entry| Arc::clone(entry.value()));
        if let Some(gate) = gate {
            let _finished = gate.lock().await;
            self.pass_gates.remove(email);
        }
    }

    /// Refuses new passes with `Disposed` and waits until every running pass
    /// has returned.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _drained = self.running.write().await;
        debug!("All synchronization passes finished");
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Runs one pass over the folders of `email` matching `filter`.
    ///
    /// Passes of one account are serialized. New messages of the whole pass
    /// are published as a single batch.
    pub async fn check_account<F>(
        &self,
        email: &EmailAddress,
        filter: F,
        cancel: &CancellationToken,
    ) -> Result<PassReport>
    where
        F: Fn(&Folder) -> bool + Send + Sync,
    {
        let _running = self.running.read().await;
        if self.is_shut_down() {
            return Err(CoreError::Disposed);
        }
        let gate = Arc::clone(self.pass_gates.entry(email.clone()).or_default().value());
        let _pass = gate.lock().await;
        self.passes_started.fetch_add(1, Ordering::SeqCst);

        let Some(service) = self.directory.service_by_email(email).await? else {
            self.pass_gates.remove(email);
            return Err(CoreError::AccountNotFound(email.clone()));
        };

        let mut report = PassReport::default();
        self.run_pass(service.as_ref(), &filter, cancel, &mut report).await;
        self.finish_pass(email, &report);
        Ok(report)
    }

    /// Scheduled pass over every folder. Absorbed failures are returned as
    /// `NewMessagesCheckFailed` so the scheduler can report them.
    pub async fn scheduled_pass(&self, email: &EmailAddress, cancel: &CancellationToken) -> Result<()> {
        let report = match self.check_account(email, |_| true, cancel).await {
            Ok(report) => report,
            Err(e) if e.is_disposed() => return Ok(()),
            Err(e) => return Err(e),
        };
        if report.failures.is_empty() {
            Ok(())
        } else {
            Err(CoreError::NewMessagesCheckFailed(report.failures))
        }
    }

    async fn run_pass<F>(
        &self,
        service: &dyn AccountService,
        filter: &F,
        cancel: &CancellationToken,
        report: &mut PassReport,
    ) where
        F: Fn(&Folder) -> bool + Send + Sync,
    {
        let email = service.email().clone();
        if cancel.is_cancelled() {
            report.cancelled = true;
            return;
        }

        let folders = match service.update_folder_structure(cancel).await {
            Ok(folders) => {
                self.directory.update_account_folders(&email, folders.clone());
                folders
            }
            Err(e) => {
                self.absorb(&email, None, e, report);
                return;
            }
        };

        for folder in folders.iter().filter(|f| filter(*f)) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return;
            }
            match service.receive_new_messages_in_folder(folder, cancel).await {
                Ok(messages) => report.received.extend(
                    messages
                        .into_iter()
                        .map(|m| ReceivedMessageInfo::new(email.clone(), m)),
                ),
                Err(e) => {
                    // Only plain per-folder failures let the siblings proceed
                    let stop = e.is_connection() || e.is_cancelled() || e.is_disposed();
                    self.absorb(&email, Some(folder.clone()), e, report);
                    if stop {
                        return;
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
            return;
        }
        if let Err(e) = service.synchronize(false, cancel).await {
            self.absorb(&email, None, e, report);
        }
    }

    fn absorb(&self, email: &EmailAddress, folder: Option<Folder>, error: CoreError, report: &mut PassReport) {
        match &error {
            CoreError::Cancelled => {
                report.cancelled = true;
                return;
            }
            CoreError::Disposed => {
                debug!("Pass for {} hit a disposed collaborator", email);
                report.cancelled = true;
                return;
            }
            e if e.is_connection() => {
                debug!("Connection lost during pass for {}: {}", email, e);
                report.connection_lost = true;
            }
            e => {
                debug!(
                    "Pass for {} failed in {}: {}",
                    email,
                    folder.as_ref().map(|f| f.full_name.as_str()).unwrap_or("<account>"),
                    e
                );
            }
        }
        report.failures.push(FolderFailure::new(email.clone(), folder, &error));
    }

    fn finish_pass(&self, email: &EmailAddress, report: &PassReport) {
        self.events.publish_messages_received(report.received.clone());

        for failure in &report.failures {
            self.failures.record(failure.clone());
            if self.config.report_folder_failures {
                self.events.publish_exception(Some(email.clone()), failure.error.clone());
            }
        }

        if !report.failures.is_empty() {
            warn!("Pass for {} finished with {} failure(s)", email, report.failures.len());
        } else {
            debug!("Pass for {} received {} message(s)", email, report.received.len());
        }
    }

    /// Checks the inbox of every account in `accounts` concurrently. Returns
    /// `false` without doing anything while another manual check runs.
    pub async fn check_inboxes(&self, accounts: &[EmailAddress], cancel: &CancellationToken) -> bool {
        let Some(_guard) = ManualCheckGuard::acquire(&self.manual_check) else {
            debug!("Manual check already running, ignoring request");
            return false;
        };

        info!("Checking inboxes of {} account(s)", accounts.len());
        let results = join_all(
            accounts
                .iter()
                .map(|email| self.check_account(email, |f: &Folder| f.is_inbox, cancel)),
        )
        .await;

        for (email, result) in accounts.iter().zip(results) {
            if let Err(e) = result {
                warn!("Inbox check for {} failed: {}", email, e);
            }
        }
        true
    }

    /// Manual check of one composite folder: a pass over the member folders
    /// of each member account. Returns `Ok(false)` without doing anything
    /// while another manual check runs.
    pub async fn check_composite_folder(&self, folder: &CompositeFolder, cancel: &CancellationToken) -> Result<bool> {
        let Some(_guard) = ManualCheckGuard::acquire(&self.manual_check) else {
            debug!("Manual check already running, ignoring request");
            return Ok(false);
        };

        let mut accounts: Vec<EmailAddress> = Vec::new();
        for member in folder.folders() {
            if !accounts.contains(&member.account_email) {
                accounts.push(member.account_email.clone());
            }
        }

        debug!("Checking {:?} in {} account(s)", folder.full_name(), accounts.len());
        let results = join_all(
            accounts
                .iter()
                .map(|email| self.check_account(email, |f: &Folder| folder.contains(f), cancel)),
        )
        .await;

        for (email, result) in accounts.iter().zip(results) {
            match result {
                Ok(_) => {}
                Err(e) if e.is_disposed() => return Err(e),
                Err(e) => warn!("Check of {:?} for {} failed: {}", folder.full_name(), email, e),
            }
        }
        Ok(true)
    }
}
