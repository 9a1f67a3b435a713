/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Locales the bot ships texts for, besides the default (English) one.
///
/// The default locale is spelled `None` wherever an `Option<Locale>` appears.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Locale {
    Ru,
    Ro,
}

impl Locale {
    pub const SUPPORTED: [Locale; 2] = [Locale::Ru, Locale::Ro];

    pub fn code(self) -> &'static str {
        match self {
            Locale::Ru => "ru",
            Locale::Ro => "ro",
        }
    }

    /// Resolve a client language code (`ru`, `ru-RU`, `RO`) to a supported
    /// locale. Anything unknown falls back to the default (`None`).
    pub fn from_language_code(code: &str) -> Option<Locale> {
        let primary = code
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        Self::SUPPORTED
            .into_iter()
            .find(|l| l.code() == primary)
    }

    /// The default locale followed by every supported one.
    pub fn all() -> impl Iterator<Item = Option<Locale>> {
        std::iter::once(None).chain(Self::SUPPORTED.into_iter().map(Some))
    }
}

/// Identity of the user who sent an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

/// What an update carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    /// Text starting with a bot command entity.
    Command,
    Text,
    Caption,
}

/// One inbound event from the messaging platform.
#[derive(Clone, Debug)]
pub struct Update {
    pub update_id: u32,
    pub sender: Option<Sender>,
    pub chat: Option<ChatId>,
    /// Sent "via" another bot (inline relay).
    pub via_bot: bool,
    pub kind: PayloadKind,
    pub text: String,
}

impl Update {
    pub fn locale_hint(&self) -> Option<Locale> {
        self.sender
            .as_ref()
            .and_then(|s| s.language_code.as_deref())
            .and_then(Locale::from_language_code)
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.sender.as_ref().map(|s| s.user_id)
    }
}
