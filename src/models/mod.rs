// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

pub mod account;
pub mod address;
pub mod folder;
pub mod message;

pub use account::{Account, AccountGroup, AuthData, MailProtocol, NO_GROUP};
pub use address::EmailAddress;
pub use folder::Folder;
pub use message::{Contact, ContactAvatar, Message, ReceivedMessageInfo, StoredSettings};
