// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-account recurring synchronization timer.
//!
//! `Stopped -> Running -> Cancelling -> Stopped`. Every start gets a fresh
//! cancellation token; each tick runs the callback under a child of it.
//! Ticks of one scheduler never overlap: a tick that finds the previous one
//! still in flight is skipped.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};
use crate::models::EmailAddress;

pub type SyncCallback = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Side channel for failures caught inside a tick.
pub type FailureReporter = Arc<dyn Fn(&EmailAddress, &CoreError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    Cancelling,
}

struct Shared {
    email: EmailAddress,
    interval_ms: AtomicU64,
    interval_changed: Notify,
    state: Mutex<SchedulerState>,
    tick_lock: tokio::sync::Mutex<()>,
    completed_ticks: AtomicU64,
    callback: SyncCallback,
    reporter: FailureReporter,
}

impl Shared {
    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Runs one pass unless one is already in flight. Returns whether it ran.
    async fn tick(&self, parent: &CancellationToken) -> bool {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            debug!("Previous pass for {} still running, skipping tick", self.email);
            return false;
        };

        let token = parent.child_token();
        let outcome = AssertUnwindSafe((self.callback)(token)).catch_unwind().await;
        self.completed_ticks.fetch_add(1, Ordering::SeqCst);

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {
                debug!("Scheduled pass for {} cancelled", self.email);
            }
            Ok(Err(e)) => {
                warn!("Scheduled pass for {} failed: {}", self.email, e);
                (self.reporter)(&self.email, &e);
            }
            Err(panic) => {
                let e = CoreError::OperationFailed(format!(
                    "Scheduled pass panicked: {}",
                    panic_message(panic.as_ref())
                ));
                error!("{} ({})", e, self.email);
                (self.reporter)(&self.email, &e);
            }
        }
        true
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn run_timer(shared: Arc<Shared>, cancel: CancellationToken) {
    info!("Scheduler for {} started, interval {:?}", shared.email, shared.interval());

    let mut last_fire = Instant::now();
    loop {
        let deadline = last_fire + shared.interval();
        tokio::select! {
            _ = cancel.cancelled() => break,
            // Recompute the pending deadline from the last fire
            _ = shared.interval_changed.notified() => continue,
            _ = sleep_until(deadline) => {}
        }
        last_fire = Instant::now();
        shared.tick(&cancel).await;
    }

    shared.set_state(SchedulerState::Stopped);
    info!("Scheduler for {} stopped", shared.email);
}

pub struct AccountScheduler {
    shared: Arc<Shared>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AccountScheduler {
    pub fn new(
        email: EmailAddress,
        interval: Duration,
        callback: SyncCallback,
        reporter: FailureReporter,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                email,
                interval_ms: AtomicU64::new(clamp_interval(interval)),
                interval_changed: Notify::new(),
                state: Mutex::new(SchedulerState::Stopped),
                tick_lock: tokio::sync::Mutex::new(()),
                completed_ticks: AtomicU64::new(0),
                callback,
                reporter,
            }),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    pub fn email(&self) -> &EmailAddress {
        &self.shared.email
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval()
    }

    /// Takes effect for the pending fire, measured from the previous one.
    pub fn set_interval(&self, interval: Duration) {
        self.shared
            .interval_ms
            .store(clamp_interval(interval), Ordering::SeqCst);
        self.shared.interval_changed.notify_one();
        debug!("Scheduler for {} retuned to {:?}", self.shared.email, interval);
    }

    pub fn completed_ticks(&self) -> u64 {
        self.shared.completed_ticks.load(Ordering::SeqCst)
    }

    /// Starts the timer. Returns `false` unless the scheduler was stopped.
    pub fn start(&self) -> bool {
        let mut state = self.shared.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state != SchedulerState::Stopped {
            return false;
        }

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(|p| p.into_inner()) = token.clone();
        *state = SchedulerState::Running;
        drop(state);

        let handle = tokio::spawn(run_timer(Arc::clone(&self.shared), token));
        *self.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        true
    }

    /// Runs a pass right away under the current token. Returns `false` when a
    /// pass is already in flight or the scheduler has been cancelled.
    pub async fn run_now(&self) -> bool {
        let token = self.cancel.lock().unwrap_or_else(|p| p.into_inner()).clone();
        if token.is_cancelled() {
            return false;
        }
        self.shared.tick(&token).await
    }

    /// Signals the in-flight pass and all future ticks to stop.
    pub fn cancel(&self) {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|p| p.into_inner());
            if *state == SchedulerState::Running {
                *state = SchedulerState::Cancelling;
            }
        }
        self.cancel.lock().unwrap_or_else(|p| p.into_inner()).cancel();
    }

    /// Cancels and waits until no callback of this scheduler is running.
    pub async fn dispose(&self) {
        self.cancel();

        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Scheduler task for {} ended abnormally: {}", self.shared.email, e);
            }
        }
        // A manual pass may still hold the tick lock
        let _idle = self.shared.tick_lock.lock().await;
        self.shared.set_state(SchedulerState::Stopped);
    }
}

impl Drop for AccountScheduler {
    fn drop(&mut self) {
        self.cancel.lock().unwrap_or_else(|p| p.into_inner()).cancel();
    }
}

fn clamp_interval(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1)
}
