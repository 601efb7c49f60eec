// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Domain used for addresses that only exist on the decentralized network.
pub const DECENTRALIZED_DOMAIN: &str = "dec";

/// Mail address of an account or contact.
///
/// Equality and hashing are case-insensitive over the address part only, so
/// the value can be used directly as a cache key. A hybrid address carries the
/// address it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAddress {
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original: Option<Box<EmailAddress>>,
}

impl EmailAddress {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            original: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_hybrid(&self) -> bool {
        self.original.is_some()
    }

    /// The address a hybrid address was derived from.
    pub fn original_address(&self) -> Option<&EmailAddress> {
        self.original.as_deref()
    }

    /// Builds the hybrid counterpart of this address: `local+key@domain`.
    pub fn make_hybrid(&self, public_key: &str) -> EmailAddress {
        let hybrid = match self.address.split_once('@') {
            Some((local, domain)) => format!("{}+{}@{}", local, public_key, domain),
            None => format!("{}+{}", self.address, public_key),
        };
        EmailAddress {
            address: hybrid,
            name: self.name.clone(),
            original: Some(Box::new(self.clone())),
        }
    }

    /// Address of an account that lives only on the decentralized network.
    pub fn decentralized(public_key: &str, name: impl Into<String>) -> EmailAddress {
        EmailAddress::new(
            format!("{}@{}", public_key.to_lowercase(), DECENTRALIZED_DOMAIN),
            name,
        )
    }

    fn key(&self) -> String {
        self.address.to_ascii_lowercase()
    }
}

impl PartialEq for EmailAddress {
    fn eq(&self, other: &Self) -> bool {
        self.address.eq_ignore_ascii_case(&other.address)
    }
}

impl Eq for EmailAddress {}

impl Hash for EmailAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

impl From<&str> for EmailAddress {
    fn from(address: &str) -> Self {
        EmailAddress::new(address, "")
    }
}
