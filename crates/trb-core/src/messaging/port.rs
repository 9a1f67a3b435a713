use async_trait::async_trait;

use crate::{
    domain::{ChatId, Locale, MessageRef},
    messaging::types::MessagingCapabilities,
    texts::CommandSpec,
    Result,
};

/// Reply side of the update source.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
}

/// Administrative side of the update source: the bot's public profile.
///
/// `None` targets the default locale (no language code).
#[async_trait]
pub trait ProfilePort: Send + Sync {
    async fn set_commands(&self, locale: Option<Locale>, commands: &[CommandSpec]) -> Result<()>;

    async fn set_description(&self, locale: Option<Locale>, text: &str) -> Result<()>;

    async fn set_short_description(&self, locale: Option<Locale>, text: &str) -> Result<()>;
}
