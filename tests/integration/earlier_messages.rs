// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Paging back through history, storage first and backend second.

#[cfg(test)]
mod earlier_messages_tests {
    use crate::common::{account, folder, message};
    use mailhub::error::CoreError;
    use mailhub::models::{EmailAddress, Folder, Message, NO_GROUP};
    use mailhub::services::{page_messages, PageEntry};
    use mailhub::testing::TestHarness;
    use std::collections::HashSet;
    use tokio_util::sync::CancellationToken;

    async fn harness_with_inbox() -> (TestHarness, Folder) {
        let harness = TestHarness::new();
        let me = account("me@example.com", NO_GROUP, &["INBOX"]);
        harness.seed_account(me.clone()).await.unwrap();
        (harness, folder(&me, "INBOX"))
    }

    fn ids(messages: &[Message]) -> Vec<u32> {
        messages.iter().map(|m| m.id).collect()
    }

    fn assert_newest_first(messages: &[Message]) {
        for pair in messages.windows(2) {
            assert!(pair[0].page_key() > pair[1].page_key(), "page out of order");
        }
    }

    #[tokio::test]
    async fn pages_split_stored_history_without_gaps() {
        let (harness, inbox) = harness_with_inbox().await;
        // Message n is n minutes old
        harness
            .storage
            .insert_messages((1..=50).map(|id| message(id, &inbox, id as i64)).collect());
        let cancel = CancellationToken::new();

        let first = harness
            .core
            .get_folder_earlier_messages(&inbox, 30, None, &cancel)
            .await
            .unwrap();
        let first = page_messages(&first);
        assert_eq!(ids(&first), (1..=30).collect::<Vec<_>>());

        let second = harness
            .core
            .get_folder_earlier_messages(&inbox, 30, first.last(), &cancel)
            .await
            .unwrap();
        assert!(!second.contains(&PageEntry::MoreAvailable));
        let second = page_messages(&second);
        assert_eq!(ids(&second), (31..=50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn short_storage_is_topped_up_from_the_backend() {
        let (harness, inbox) = harness_with_inbox().await;
        harness
            .storage
            .insert_messages((1..=10).map(|id| message(id, &inbox, id as i64)).collect());
        harness.behavior().push_remote_earlier(
            &inbox,
            (11..=40).map(|id| message(id, &inbox, id as i64)).collect(),
        );
        let cancel = CancellationToken::new();

        let mut seen = Vec::new();
        let mut last: Option<Message> = None;
        loop {
            let page = harness
                .core
                .get_folder_earlier_messages(&inbox, 12, last.as_ref(), &cancel)
                .await
                .unwrap();
            let messages = page_messages(&page);
            if messages.is_empty() {
                break;
            }
            assert_newest_first(&messages);
            last = messages.last().cloned();
            seen.extend(messages);
        }

        assert_newest_first(&seen);
        let unique: HashSet<u32> = seen.iter().map(|m| m.id).collect();
        assert_eq!(unique.len(), seen.len(), "a message was served twice");
        assert_eq!(ids(&seen), (1..=40).collect::<Vec<_>>());
        assert_eq!(harness.storage.messages_in(&inbox).len(), 40);
    }

    #[tokio::test]
    async fn one_backend_pull_fills_a_short_page() {
        let (harness, inbox) = harness_with_inbox().await;
        let newest_seen = message(1000, &inbox, 0);
        harness
            .storage
            .insert_messages((1..=30).map(|id| message(id, &inbox, id as i64)).collect());
        harness.behavior().push_remote_earlier(
            &inbox,
            (31..=130).map(|id| message(id, &inbox, id as i64)).collect(),
        );

        let page = harness
            .core
            .get_folder_earlier_messages(&inbox, 50, Some(&newest_seen), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&page_messages(&page)), (1..=50).collect::<Vec<_>>());
        assert_eq!(harness.behavior().earlier_pulls(&inbox), 1);
    }

    #[tokio::test]
    async fn pulled_messages_newer_than_the_page_tail_are_not_lost() {
        let harness = TestHarness::new();
        let a = account("a@example.com", NO_GROUP, &["INBOX"]);
        let b = account("b@example.com", NO_GROUP, &["INBOX"]);
        harness.seed_account(a.clone()).await.unwrap();
        harness.seed_account(b.clone()).await.unwrap();
        let a_inbox = folder(&a, "INBOX");
        let b_inbox = folder(&b, "INBOX");

        let mut stored: Vec<Message> = (1..=10).map(|id| message(id, &a_inbox, id as i64)).collect();
        stored.push(message(103, &b_inbox, 3));
        harness.storage.insert_messages(stored);
        harness.behavior().push_remote_earlier(
            &b_inbox,
            (104..=109)
                .chain(111..=120)
                .map(|id| message(id, &b_inbox, (id - 100) as i64))
                .collect(),
        );
        let cancel = CancellationToken::new();

        let mut seen = Vec::new();
        let mut last: Option<Message> = None;
        loop {
            let page = harness
                .core
                .get_all_earlier_messages(20, last.as_ref(), &cancel)
                .await
                .unwrap();
            let messages = page_messages(&page);
            if messages.is_empty() {
                break;
            }
            last = messages.last().cloned();
            seen.extend(messages);
        }

        assert_newest_first(&seen);
        let mut expected: Vec<u32> = (1..=10).chain(103..=109).chain(111..=120).collect();
        expected.sort_unstable();
        let mut got = ids(&seen);
        got.sort_unstable();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn backend_progress_without_a_page_yields_the_marker() {
        let (harness, inbox) = harness_with_inbox().await;
        let oldest_seen = message(100, &inbox, 500);
        // Backend only has messages newer than the cursor
        harness
            .behavior()
            .push_remote_earlier(&inbox, vec![message(101, &inbox, 10), message(102, &inbox, 20)]);

        let page = harness
            .core
            .get_folder_earlier_messages(&inbox, 10, Some(&oldest_seen), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(page, vec![PageEntry::MoreAvailable]);
    }

    #[tokio::test]
    async fn exhausted_history_returns_an_empty_page() {
        let (harness, inbox) = harness_with_inbox().await;

        let page = harness
            .core
            .get_folder_earlier_messages(&inbox, 10, None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn connection_loss_degrades_to_stored_messages() {
        let (harness, inbox) = harness_with_inbox().await;
        harness
            .storage
            .insert_messages((1..=5).map(|id| message(id, &inbox, id as i64)).collect());
        harness
            .behavior()
            .fail_folder(&inbox, CoreError::Connection("offline".into()));

        let page = harness
            .core
            .get_folder_earlier_messages(&inbox, 10, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&page_messages(&page)), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn other_backend_failures_propagate() {
        let (harness, inbox) = harness_with_inbox().await;
        harness
            .behavior()
            .fail_folder(&inbox, CoreError::OperationFailed("bad response".into()));

        let err = harness
            .core
            .get_folder_earlier_messages(&inbox, 10, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn contact_history_spans_every_inbox() {
        let harness = TestHarness::new();
        let a = account("a@example.com", NO_GROUP, &["INBOX"]);
        let b = account("b@example.com", NO_GROUP, &["INBOX"]);
        harness.seed_account(a.clone()).await.unwrap();
        harness.seed_account(b.clone()).await.unwrap();
        let contact = EmailAddress::from("friend@example.org");

        let mut from_friend = message(1, &folder(&a, "INBOX"), 5);
        from_friend.from = vec![contact.clone()];
        let mut to_friend = message(2, &folder(&b, "INBOX"), 1);
        to_friend.to = vec![contact.clone()];
        let unrelated = message(3, &folder(&b, "INBOX"), 3);
        harness.storage.insert_messages(vec![from_friend, to_friend, unrelated]);

        let page = harness
            .core
            .get_contact_earlier_messages(&contact, 10, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&page_messages(&page)), vec![2, 1]);
    }

    #[tokio::test]
    async fn all_inboxes_are_paged_together() {
        let harness = TestHarness::new();
        let a = account("a@example.com", NO_GROUP, &["INBOX", "Archive"]);
        let b = account("b@example.com", NO_GROUP, &["INBOX"]);
        harness.seed_account(a.clone()).await.unwrap();
        harness.seed_account(b.clone()).await.unwrap();
        harness.storage.insert_messages(vec![
            message(1, &folder(&a, "INBOX"), 3),
            message(2, &folder(&b, "INBOX"), 2),
            message(3, &folder(&a, "Archive"), 1),
        ]);

        let page = harness
            .core
            .get_all_earlier_messages(10, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&page_messages(&page)), vec![2, 1]);
    }
}
