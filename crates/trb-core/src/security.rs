use std::collections::HashSet;

use serde::Deserialize;

use crate::domain::Update;

// ============== Whitelist ==============

/// Usernames allowed to talk to the bot. `None` allows everyone.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "WhitelistFile")]
pub struct WhitelistConfig {
    usernames: Option<HashSet<String>>,
}

#[derive(Deserialize)]
struct WhitelistFile {
    #[serde(default)]
    usernames_whitelist: Option<Vec<String>>,
}

impl From<WhitelistFile> for WhitelistConfig {
    fn from(f: WhitelistFile) -> Self {
        Self::new(f.usernames_whitelist)
    }
}

impl WhitelistConfig {
    pub fn new<I, S>(usernames: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            usernames: usernames.map(|it| {
                it.into_iter()
                    .map(|s| normalize_username(s.as_ref()))
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        }
    }

    pub fn allow_all() -> Self {
        Self { usernames: None }
    }

    pub fn is_restricted(&self) -> bool {
        self.usernames.is_some()
    }

    pub fn len(&self) -> Option<usize> {
        self.usernames.as_ref().map(|u| u.len())
    }

    /// Whitelist predicate on its own. A sender without a username only
    /// passes an unrestricted whitelist.
    pub fn allows(&self, username: Option<&str>) -> bool {
        let Some(allowed) = &self.usernames else {
            return true;
        };
        let Some(username) = username else {
            return false;
        };
        allowed.contains(&normalize_username(username))
    }
}

/// Telegram usernames are case-insensitive and often written with `@`.
fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_ascii_lowercase()
}

// ============== Authorization filter ==============

/// Why an update was dropped. Expected traffic, so only logged at debug.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    NoSender,
    ViaBot,
    NoChat,
    NotWhitelisted,
}

#[derive(Clone, Debug)]
pub struct AuthorizationFilter {
    whitelist: WhitelistConfig,
}

impl AuthorizationFilter {
    pub fn new(whitelist: WhitelistConfig) -> Self {
        Self { whitelist }
    }

    /// Structural predicates first, then the whitelist; all must hold.
    pub fn check(&self, update: &Update) -> std::result::Result<(), Rejection> {
        let Some(sender) = &update.sender else {
            return Err(Rejection::NoSender);
        };
        if update.via_bot {
            return Err(Rejection::ViaBot);
        }
        if update.chat.is_none() {
            return Err(Rejection::NoChat);
        }
        if !self.whitelist.allows(sender.username.as_deref()) {
            return Err(Rejection::NotWhitelisted);
        }
        Ok(())
    }

    pub fn allow(&self, update: &Update) -> bool {
        self.check(update).is_ok()
    }
}
