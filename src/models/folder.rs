// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::address::EmailAddress;

/// A physical folder owned by exactly one account.
///
/// Identity is the owning account plus the case-insensitive full name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub full_name: String,
    pub account_email: EmailAddress,
    #[serde(default)]
    pub is_inbox: bool,
}

impl Folder {
    pub fn new(full_name: impl Into<String>, account_email: EmailAddress, is_inbox: bool) -> Self {
        Self {
            full_name: full_name.into(),
            account_email,
            is_inbox,
        }
    }

    pub fn has_same_name(&self, full_name: &str) -> bool {
        self.full_name.eq_ignore_ascii_case(full_name)
    }

    /// Key used to merge same-named folders across accounts.
    pub fn name_key(&self) -> String {
        self.full_name.to_ascii_lowercase()
    }
}

impl PartialEq for Folder {
    fn eq(&self, other: &Self) -> bool {
        self.account_email == other.account_email && self.has_same_name(&other.full_name)
    }
}

impl Eq for Folder {}

impl Hash for Folder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.account_email.hash(state);
        self.name_key().hash(state);
    }
}
