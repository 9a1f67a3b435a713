//! Command registry: command names bound to handlers.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, Locale, Update},
    errors::Error,
    formatting::escape_html,
    messaging::port::MessagingPort,
    texts::{self, CommandSpec, ReplyKey},
    Result,
};

/// Everything a command handler may touch while handling one update.
pub struct CommandContext<'a> {
    pub messenger: &'a dyn MessagingPort,
    pub chat_id: ChatId,
    pub locale: Option<Locale>,
    pub update: &'a Update,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: CommandContext<'_>) -> Result<()>;
}

/// Replies with a fixed, localized text.
pub struct ReplyCommand {
    key: ReplyKey,
}

impl ReplyCommand {
    pub fn new(key: ReplyKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl CommandHandler for ReplyCommand {
    async fn handle(&self, ctx: CommandContext<'_>) -> Result<()> {
        let text = texts::reply(self.key, ctx.locale);
        ctx.messenger
            .send_html(ctx.chat_id, &escape_html(text))
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct Command {
    pub name: &'static str,
    pub handler: Arc<dyn CommandHandler>,
}

impl Command {
    /// Menu text for this command in `locale`.
    pub fn display_text(&self, locale: Option<Locale>) -> Option<&'static str> {
        texts::command_sequence(locale)
            .into_iter()
            .find(|c| c.name == self.name)
            .map(|c| c.description)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command").field("name", &self.name).finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct CommandRegistry {
    ordered: Vec<Command>,
    by_name: HashMap<&'static str, usize>,
}

impl CommandRegistry {
    /// Registry with a handler for every command in the default command list.
    pub fn from_texts() -> Result<Self> {
        let mut registry = Self::default();
        for spec in texts::command_sequence(None) {
            let handler: Arc<dyn CommandHandler> = match spec.name {
                "start" => Arc::new(ReplyCommand::new(ReplyKey::Start)),
                "help" => Arc::new(ReplyCommand::new(ReplyKey::Help)),
                other => {
                    return Err(Error::Config(format!("no handler for command /{other}")));
                }
            };
            registry.register(spec.name, handler)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: &'static str, handler: Arc<dyn CommandHandler>) -> Result<()> {
        if self.by_name.contains_key(name) {
            return Err(Error::Config(format!("command /{name} registered twice")));
        }
        self.by_name.insert(name, self.ordered.len());
        self.ordered.push(Command { name, handler });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.by_name.get(name).map(|&i| &self.ordered[i])
    }

    pub fn commands(&self) -> &[Command] {
        &self.ordered
    }

    /// Command menu for `locale`, in registration order. Commands without
    /// menu text stay reachable but are not advertised.
    pub fn menu(&self, locale: Option<Locale>) -> Vec<CommandSpec> {
        self.ordered
            .iter()
            .filter_map(|c| {
                c.display_text(locale).map(|description| CommandSpec {
                    name: c.name,
                    description,
                })
            })
            .collect()
    }
}

/// A `/command` token split from its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    /// `@botname` suffix, if any.
    pub mention: Option<String>,
    pub args: String,
}

/// Parse `/cmd`, `/cmd@botname` and `/cmd args`.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let text = text.trim_start();
    let rest = text.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let token = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim().to_string();

    let (name, mention) = match token.split_once('@') {
        Some((n, m)) => (n, Some(m.to_string())),
        None => (token, None),
    };
    if name.is_empty() {
        return None;
    }

    Some(ParsedCommand {
        name: name.to_lowercase(),
        mention,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl CommandHandler for Noop {
        async fn handle(&self, _ctx: CommandContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn registry_covers_the_command_menu() {
        let reg = CommandRegistry::from_texts().unwrap();
        let names: Vec<_> = reg.commands().iter().map(|c| c.name).collect();
        let menu: Vec<_> = texts::command_sequence(None)
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, menu);
        assert!(reg.lookup("start").is_some());
        assert!(reg.lookup("nope").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut reg = CommandRegistry::default();
        reg.register("x", Arc::new(Noop)).unwrap();
        let err = reg.register("x", Arc::new(Noop)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(reg.commands().len(), 1);
    }

    #[test]
    fn display_text_follows_locale() {
        let reg = CommandRegistry::from_texts().unwrap();
        let start = reg.lookup("start").unwrap();
        assert_eq!(start.display_text(None), Some("Start the bot"));
        assert_eq!(start.display_text(Some(Locale::Ru)), Some("Запустить бота"));
    }

    #[test]
    fn menu_lists_registered_commands_with_text() {
        let mut reg = CommandRegistry::from_texts().unwrap();
        reg.register("debug", Arc::new(Noop)).unwrap();

        for locale in Locale::all() {
            assert_eq!(reg.menu(locale), texts::command_sequence(locale));
        }
        assert!(reg.lookup("debug").is_some());
    }

    #[test]
    fn parses_command_tokens() {
        assert_eq!(
            parse_command("/start"),
            Some(ParsedCommand {
                name: "start".to_string(),
                mention: None,
                args: String::new(),
            })
        );
        let p = parse_command("/Help@my_bot  some args ").unwrap();
        assert_eq!(p.name, "help");
        assert_eq!(p.mention.as_deref(), Some("my_bot"));
        assert_eq!(p.args, "some args");

        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/@bot"), None);
    }
}
