// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Composite accounts built from stored accounts and groups.

#[cfg(test)]
mod composite_grouping_tests {
    use crate::common::{account, drain, folder, message};
    use mailhub::models::{AccountGroup, NO_GROUP};
    use mailhub::services::events::MailEvent;
    use mailhub::testing::TestHarness;
    use tokio_util::sync::CancellationToken;

    async fn harness_with_groups() -> TestHarness {
        let harness = TestHarness::new();
        harness.storage.insert_group(AccountGroup { id: 1, name: "Work".into() });
        harness.storage.insert_group(AccountGroup { id: 2, name: "Home".into() });
        harness.seed_account(account("solo@example.com", NO_GROUP, &["INBOX", "Notes"])).await.unwrap();
        harness.seed_account(account("work1@example.com", 1, &["INBOX", "Sent", "Projects"])).await.unwrap();
        harness.seed_account(account("home@example.com", 2, &["Inbox"])).await.unwrap();
        harness.seed_account(account("work2@example.com", 1, &["Inbox", "sent"])).await.unwrap();
        harness
    }

    #[tokio::test]
    async fn grouped_accounts_merge_same_named_folders() {
        let harness = harness_with_groups().await;

        let composites = harness.core.get_composite_accounts().await.unwrap();

        let emails: Vec<_> = composites.iter().map(|c| c.email().address().to_string()).collect();
        assert_eq!(
            emails,
            vec!["solo@example.com", "work1@example.com", "home@example.com"]
        );

        let work = &composites[1];
        assert_eq!(work.group().map(|g| g.name.as_str()), Some("Work"));
        assert_eq!(work.addresses().len(), 2);

        let names: Vec<_> = work.folders().iter().map(|f| f.full_name().unwrap_or_default()).collect();
        assert_eq!(names, vec!["INBOX", "Sent", "Projects"]);
        assert_eq!(work.folder_by_name("inbox").unwrap().folders().len(), 2);
        assert_eq!(work.folder_by_name("SENT").unwrap().folders().len(), 2);
        assert_eq!(work.folder_by_name("Projects").unwrap().folders().len(), 1);
        assert_eq!(work.default_inbox().folders().len(), 2);
    }

    #[tokio::test]
    async fn ungrouped_account_stands_alone() {
        let harness = harness_with_groups().await;

        let composites = harness.core.get_composite_accounts().await.unwrap();

        let solo = &composites[0];
        assert!(solo.group().is_none());
        assert_eq!(solo.addresses().len(), 1);
        assert!(solo.folders().iter().all(|f| f.folders().len() == 1));
    }

    #[tokio::test]
    async fn accounts_of_unknown_groups_are_left_out() {
        let harness = TestHarness::new();
        harness.seed_account(account("lost@example.com", 42, &["INBOX"])).await.unwrap();
        harness.seed_account(account("solo@example.com", NO_GROUP, &["INBOX"])).await.unwrap();

        let composites = harness.core.get_composite_accounts().await.unwrap();

        assert_eq!(composites.len(), 1);
        assert_eq!(composites[0].email().address(), "solo@example.com");
    }

    #[tokio::test]
    async fn checking_a_composite_folder_reaches_every_member() {
        let harness = harness_with_groups().await;
        let work1 = harness.core.get_account(&"work1@example.com".into()).await.unwrap();
        let work2 = harness.core.get_account(&"work2@example.com".into()).await.unwrap();
        let behavior = harness.behavior();
        behavior.push_new_messages(&folder(&work1, "INBOX"), vec![message(1, &folder(&work1, "INBOX"), 5)]);
        behavior.push_new_messages(&folder(&work2, "Inbox"), vec![message(7, &folder(&work2, "Inbox"), 1)]);

        let composites = harness.core.get_composite_accounts().await.unwrap();
        let inbox = composites[1].default_inbox().clone();
        let mut events = harness.core.subscribe();

        assert!(harness
            .core
            .check_for_new_messages_in_folder(&inbox, &CancellationToken::new())
            .await
            .unwrap());

        let mut received: Vec<u32> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                MailEvent::MessagesReceived { messages, .. } => Some(messages),
                _ => None,
            })
            .flatten()
            .map(|info| info.message.id)
            .collect();
        received.sort_unstable();
        assert_eq!(received, vec![1, 7]);
        assert_eq!(behavior.synchronize_calls(&work1.email), 1);
        assert_eq!(behavior.synchronize_calls(&work2.email), 1);
    }
}
