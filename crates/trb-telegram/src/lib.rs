//! Telegram adapter (teloxide).
//!
//! This crate implements the `trb-core` messaging and profile ports over the
//! Telegram Bot API and feeds incoming messages to the core dispatcher.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{BotCommand, ParseMode},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use trb_core::{
    domain::{ChatId, Locale, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::{MessagingPort, ProfilePort},
        types::MessagingCapabilities,
    },
    texts::CommandSpec,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::warn!(retry_after = ?d.duration(), "telegram flood control");
                        sleep(d.duration()).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

fn bot_commands(commands: &[CommandSpec]) -> Vec<BotCommand> {
    commands
        .iter()
        .map(|c| BotCommand::new(c.name, c.description))
        .collect()
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}

#[async_trait]
impl ProfilePort for TelegramMessenger {
    async fn set_commands(&self, locale: Option<Locale>, commands: &[CommandSpec]) -> Result<()> {
        let commands = bot_commands(commands);
        self.with_retry(|| {
            let mut req = self.bot.set_my_commands(commands.clone());
            if let Some(l) = locale {
                req = req.language_code(l.code());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn set_description(&self, locale: Option<Locale>, text: &str) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.set_my_description().description(text);
            if let Some(l) = locale {
                req = req.language_code(l.code());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn set_short_description(&self, locale: Option<Locale>, text: &str) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.set_my_short_description().short_description(text);
            if let Some(l) = locale {
                req = req.language_code(l.code());
            }
            req
        })
        .await?;
        Ok(())
    }
}
