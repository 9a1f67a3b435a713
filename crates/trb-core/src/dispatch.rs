//! Update routing: authorization filter → command or translation handler.
//!
//! Every update is handled on its own task so a slow reply or translation
//! never holds up unrelated updates. Only translation jobs serialize, through
//! the offload pool. Failures (including panics) end up in the
//! [`ErrorHandler`] and never reach the update source.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::{
    commands::{parse_command, Command, CommandContext, CommandRegistry},
    domain::{ChatId, Locale, PayloadKind, Update, UserId},
    errors::Error,
    formatting::{escape_html, truncate_chars},
    messaging::port::MessagingPort,
    offload::{OffloadJob, OffloadPool},
    ports::TranslationContext,
    security::{AuthorizationFilter, Rejection},
    texts::{self, ReplyKey},
    Result,
};

/// Identifies the update an error belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorContext {
    pub update_id: u32,
    pub chat_id: Option<ChatId>,
    pub user_id: Option<UserId>,
}

impl ErrorContext {
    fn of(update: &Update) -> Self {
        Self {
            update_id: update.update_id,
            chat_id: update.chat,
            user_id: update.user_id(),
        }
    }
}

/// Receives every error raised while handling an update. Must not panic.
pub trait ErrorHandler: Send + Sync {
    fn on_error(&self, ctx: &ErrorContext, err: &Error);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn on_error(&self, ctx: &ErrorContext, err: &Error) {
        tracing::error!(
            update_id = ctx.update_id,
            chat_id = ctx.chat_id.map(|c| c.0),
            user_id = ctx.user_id.map(|u| u.0),
            error = %err,
            "application error"
        );
    }
}

/// Where an accepted update goes.
#[derive(Clone, Debug)]
pub enum Route {
    Command(Command),
    Translate,
    /// Unknown command, command with arguments, or addressed to another bot.
    Ignore,
}

/// How handling an update ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Rejected(Rejection),
    Ignored,
    Command(&'static str),
    Translated,
    TranslationFailed,
    NothingToTranslate,
}

pub struct Dispatcher {
    filter: AuthorizationFilter,
    commands: CommandRegistry,
    messenger: Arc<dyn MessagingPort>,
    pool: Arc<OffloadPool>,
    errors: Arc<dyn ErrorHandler>,
    bot_username: Option<String>,
    tasks: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        filter: AuthorizationFilter,
        commands: CommandRegistry,
        messenger: Arc<dyn MessagingPort>,
        pool: Arc<OffloadPool>,
    ) -> Self {
        Self {
            filter,
            commands,
            messenger,
            pool,
            errors: Arc::new(LoggingErrorHandler),
            bot_username: None,
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_error_handler(mut self, errors: Arc<dyn ErrorHandler>) -> Self {
        self.errors = errors;
        self
    }

    /// Our own username, so `/cmd@other_bot` is left alone.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Tracker of every task started by [`Dispatcher::spawn`], for waiting
    /// on in-flight updates at shutdown.
    pub fn tasks(&self) -> TaskTracker {
        self.tasks.clone()
    }

    /// Handle `update` on a fresh task and return immediately.
    ///
    /// The returned handle never yields an error: failures are routed to the
    /// error handler.
    pub fn spawn(self: &Arc<Self>, update: Update) -> JoinHandle<()> {
        let this = self.clone();
        self.tasks.spawn(async move {
            let ctx = ErrorContext::of(&update);
            let worker = this.clone();
            let joined = tokio::spawn(async move { worker.handle(update).await }).await;
            match joined {
                Ok(Ok(outcome)) => {
                    tracing::debug!(update_id = ctx.update_id, ?outcome, "update handled");
                }
                Ok(Err(e)) => this.errors.on_error(&ctx, &e),
                Err(e) if e.is_panic() => {
                    let err = Error::Handler(format!("handler panicked: {}", panic_text(e)));
                    this.errors.on_error(&ctx, &err);
                }
                Err(_) => {
                    tracing::debug!(update_id = ctx.update_id, "update handling cancelled");
                }
            }
        })
    }

    /// Run one update through filter → route → handler.
    pub async fn handle(&self, update: Update) -> Result<Outcome> {
        if let Err(reason) = self.filter.check(&update) {
            tracing::debug!(update_id = update.update_id, ?reason, "update rejected");
            return Ok(Outcome::Rejected(reason));
        }
        let Some(chat_id) = update.chat else {
            return Ok(Outcome::Rejected(Rejection::NoChat));
        };
        let locale = update.locale_hint();

        match self.route(&update) {
            Route::Ignore => {
                tracing::debug!(update_id = update.update_id, "update ignored");
                Ok(Outcome::Ignored)
            }
            Route::Command(cmd) => {
                tracing::info!(update_id = update.update_id, command = cmd.name, "command");
                cmd.handler
                    .handle(CommandContext {
                        messenger: self.messenger.as_ref(),
                        chat_id,
                        locale,
                        update: &update,
                    })
                    .await?;
                Ok(Outcome::Command(cmd.name))
            }
            Route::Translate => self.handle_translation(&update, chat_id, locale).await,
        }
    }

    pub fn route(&self, update: &Update) -> Route {
        match update.kind {
            PayloadKind::Text | PayloadKind::Caption => Route::Translate,
            PayloadKind::Command => {
                let Some(parsed) = parse_command(&update.text) else {
                    return Route::Ignore;
                };
                if !parsed.args.is_empty() {
                    return Route::Ignore;
                }
                if let (Some(mention), Some(me)) = (&parsed.mention, &self.bot_username) {
                    if !mention.eq_ignore_ascii_case(me) {
                        return Route::Ignore;
                    }
                }
                match self.commands.lookup(&parsed.name) {
                    Some(cmd) => Route::Command(cmd.clone()),
                    None => Route::Ignore,
                }
            }
        }
    }

    async fn handle_translation(
        &self,
        update: &Update,
        chat_id: ChatId,
        locale: Option<Locale>,
    ) -> Result<Outcome> {
        let input = update.text.trim();
        if input.is_empty() {
            self.reply(chat_id, ReplyKey::NothingToTranslate, locale)
                .await?;
            return Ok(Outcome::NothingToTranslate);
        }

        let pending = self.pool.submit(OffloadJob {
            input: input.to_string(),
            context: TranslationContext { locale },
        });

        match pending.await {
            Ok(translated) => {
                let limit = self.messenger.capabilities().max_message_len;
                let text = truncate_chars(&translated, limit);
                self.messenger
                    .send_html(chat_id, &escape_html(&text))
                    .await?;
                Ok(Outcome::Translated)
            }
            Err(e) => {
                tracing::warn!(update_id = update.update_id, error = %e, "translation unavailable");
                self.reply(chat_id, ReplyKey::TranslationFailed, locale)
                    .await?;
                Ok(Outcome::TranslationFailed)
            }
        }
    }

    async fn reply(&self, chat_id: ChatId, key: ReplyKey, locale: Option<Locale>) -> Result<()> {
        let text = texts::reply(key, locale);
        self.messenger.send_html(chat_id, &escape_html(text)).await?;
        Ok(())
    }
}

fn panic_text(e: tokio::task::JoinError) -> String {
    let payload = e.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
