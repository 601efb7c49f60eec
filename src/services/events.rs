// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Event hub for the orchestration core
//
// Every account service, scheduler and caller-facing operation publishes into
// one hub. Publishing never blocks: each subscriber owns an unbounded queue
// and drains it on its own task.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{Account, Contact, EmailAddress, Folder, Message, ReceivedMessageInfo};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MailEvent {
    MessagesReceived {
        messages: Vec<ReceivedMessageInfo>,
        timestamp: DateTime<Utc>,
    },
    UnreadMessagesReceived {
        email: EmailAddress,
        folder: Folder,
        count: usize,
        timestamp: DateTime<Utc>,
    },
    MessageDeleted {
        email: EmailAddress,
        folder: Folder,
        message_id: u32,
        timestamp: DateTime<Utc>,
    },
    MessagesIsReadChanged {
        messages: Vec<Message>,
        timestamp: DateTime<Utc>,
    },
    MessagesIsFlaggedChanged {
        messages: Vec<Message>,
        timestamp: DateTime<Utc>,
    },
    AccountAdded {
        account: Account,
        timestamp: DateTime<Utc>,
    },
    AccountUpdated {
        account: Account,
        timestamp: DateTime<Utc>,
    },
    AccountDeleted {
        account: Account,
        timestamp: DateTime<Utc>,
    },
    ContactAdded {
        contact: Contact,
        timestamp: DateTime<Utc>,
    },
    ContactChanged {
        contact: Contact,
        timestamp: DateTime<Utc>,
    },
    ContactDeleted {
        email: EmailAddress,
        timestamp: DateTime<Utc>,
    },
    ExceptionOccurred {
        source: Option<EmailAddress>,
        error: String,
        timestamp: DateTime<Utc>,
    },
    WipeAllDataNeeded {
        timestamp: DateTime<Utc>,
    },
}

impl MailEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MailEvent::MessagesReceived { .. } => "messages_received",
            MailEvent::UnreadMessagesReceived { .. } => "unread_messages_received",
            MailEvent::MessageDeleted { .. } => "message_deleted",
            MailEvent::MessagesIsReadChanged { .. } => "messages_is_read_changed",
            MailEvent::MessagesIsFlaggedChanged { .. } => "messages_is_flagged_changed",
            MailEvent::AccountAdded { .. } => "account_added",
            MailEvent::AccountUpdated { .. } => "account_updated",
            MailEvent::AccountDeleted { .. } => "account_deleted",
            MailEvent::ContactAdded { .. } => "contact_added",
            MailEvent::ContactChanged { .. } => "contact_changed",
            MailEvent::ContactDeleted { .. } => "contact_deleted",
            MailEvent::ExceptionOccurred { .. } => "exception_occurred",
            MailEvent::WipeAllDataNeeded { .. } => "wipe_all_data_needed",
        }
    }
}

// Event subscription handle
pub struct Subscription {
    id: String,
    receiver: mpsc::UnboundedReceiver<MailEvent>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn recv(&mut self) -> Option<MailEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MailEvent> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Clone)]
pub struct EventHub {
    subscribers: Arc<DashMap<String, mpsc::UnboundedSender<MailEvent>>>,
    event_history: Arc<Mutex<VecDeque<MailEvent>>>,
    max_history_size: usize,
}

impl EventHub {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            event_history: Arc::new(Mutex::new(VecDeque::new())),
            max_history_size: max_history_size.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4().to_string();
        self.subscribers.insert(id.clone(), tx);

        info!("New event hub subscription: {}", id);

        Subscription { id, receiver: rx }
    }

    pub fn unsubscribe(&self, subscription_id: &str) {
        if self.subscribers.remove(subscription_id).is_some() {
            info!("Event hub subscription removed: {}", subscription_id);
        }
    }

    pub fn publish(&self, event: MailEvent) {
        debug!("Publishing event: {}", event.kind());

        {
            let mut history = self
                .event_history
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            history.push_back(event.clone());
            while history.len() > self.max_history_size {
                history.pop_front();
            }
        }

        let mut failed_subscribers = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().send(event.clone()).is_err() {
                failed_subscribers.push(entry.key().clone());
            }
        }

        for id in failed_subscribers {
            self.subscribers.remove(&id);
            warn!("Removed closed subscriber: {}", id);
        }
    }

    pub fn history(&self, count: usize) -> Vec<MailEvent> {
        let history = self
            .event_history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let start = history.len().saturating_sub(count);
        history.iter().skip(start).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.event_history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        info!("Event history cleared");
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(100)
    }
}

// Builders for the common events
impl EventHub {
    pub fn publish_messages_received(&self, messages: Vec<ReceivedMessageInfo>) {
        if messages.is_empty() {
            return;
        }
        self.publish(MailEvent::MessagesReceived {
            messages,
            timestamp: Utc::now(),
        });
    }

    pub fn publish_account_added(&self, account: Account) {
        self.publish(MailEvent::AccountAdded {
            account,
            timestamp: Utc::now(),
        });
    }

    pub fn publish_account_updated(&self, account: Account) {
        self.publish(MailEvent::AccountUpdated {
            account,
            timestamp: Utc::now(),
        });
    }

    pub fn publish_account_deleted(&self, account: Account) {
        self.publish(MailEvent::AccountDeleted {
            account,
            timestamp: Utc::now(),
        });
    }

    pub fn publish_contact_added(&self, contact: Contact) {
        self.publish(MailEvent::ContactAdded {
            contact,
            timestamp: Utc::now(),
        });
    }

    pub fn publish_contact_changed(&self, contact: Contact) {
        self.publish(MailEvent::ContactChanged {
            contact,
            timestamp: Utc::now(),
        });
    }

    pub fn publish_contact_deleted(&self, email: EmailAddress) {
        self.publish(MailEvent::ContactDeleted {
            email,
            timestamp: Utc::now(),
        });
    }

    pub fn publish_exception(&self, source: Option<EmailAddress>, error: String) {
        self.publish(MailEvent::ExceptionOccurred {
            source,
            error,
            timestamp: Utc::now(),
        });
    }

    pub fn publish_wipe_all_data(&self) {
        self.publish(MailEvent::WipeAllDataNeeded {
            timestamp: Utc::now(),
        });
    }
}
