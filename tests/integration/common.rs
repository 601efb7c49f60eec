// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use mailhub::models::{Account, EmailAddress, Folder, Message};
use mailhub::services::events::{MailEvent, Subscription};

pub fn base_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Account with the given folders; the one named `INBOX` (any case) is the inbox.
pub fn account(email: &str, group_id: i32, folders: &[&str]) -> Account {
    let email = EmailAddress::from(email);
    let mut account = Account::new(email.clone());
    account.group_id = group_id;
    account.set_folders_structure(
        folders
            .iter()
            .map(|name| Folder::new(*name, email.clone(), name.eq_ignore_ascii_case("inbox")))
            .collect(),
    );
    account
}

pub fn folder(account: &Account, name: &str) -> Folder {
    account
        .folders_structure
        .iter()
        .find(|f| f.has_same_name(name))
        .cloned()
        .unwrap_or_else(|| panic!("{} has no folder {}", account.email, name))
}

/// Message `id` of `folder`, `minutes_ago` minutes before the base date.
pub fn message(id: u32, folder: &Folder, minutes_ago: i64) -> Message {
    let mut message = Message::new(id, folder.clone(), base_date() - ChronoDuration::minutes(minutes_ago));
    message.subject = format!("Message {}", id);
    message.from = vec![EmailAddress::from("sender@example.org")];
    message.to = vec![folder.account_email.clone()];
    message
}

/// Everything published so far, without waiting.
pub fn drain(subscription: &mut Subscription) -> Vec<MailEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscription.try_recv() {
        events.push(event);
    }
    events
}

pub fn kinds(events: &[MailEvent]) -> Vec<&'static str> {
    events.iter().map(MailEvent::kind).collect()
}
