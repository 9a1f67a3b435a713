//! Static locale → text tables for commands and replies.
//!
//! Every table has one row per command/reply and one column per locale; a
//! missing column would be a compile error, so partial localization cannot
//! slip in.

use crate::domain::Locale;

/// A command as published to the platform's command menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// Reply strings the bot sends or publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplyKey {
    Description,
    ShortDescription,
    Start,
    Help,
    TranslationFailed,
    NothingToTranslate,
}

struct Localized {
    default: &'static str,
    ru: &'static str,
    ro: &'static str,
}

impl Localized {
    fn get(&self, locale: Option<Locale>) -> &'static str {
        match locale {
            None => self.default,
            Some(Locale::Ru) => self.ru,
            Some(Locale::Ro) => self.ro,
        }
    }
}

const COMMANDS: &[(&str, Localized)] = &[
    (
        "start",
        Localized {
            default: "Start the bot",
            ru: "Запустить бота",
            ro: "Pornește botul",
        },
    ),
    (
        "help",
        Localized {
            default: "How to use the bot",
            ru: "Как пользоваться ботом",
            ro: "Cum se folosește botul",
        },
    ),
];

fn reply_table(key: ReplyKey) -> &'static Localized {
    const DESCRIPTION: Localized = Localized {
        default: "Send me any text or a captioned photo and I will translate it. \
                  Romanian goes to your language, everything else goes to Romanian.",
        ru: "Отправьте мне текст или фото с подписью, и я переведу его. \
             Румынский переводится на ваш язык, всё остальное на румынский.",
        ro: "Trimite-mi orice text sau o fotografie cu descriere și o voi traduce. \
             Româna se traduce în limba ta, restul în română.",
    };
    const SHORT_DESCRIPTION: Localized = Localized {
        default: "Translator to and from Romanian",
        ru: "Переводчик с румынского и на румынский",
        ro: "Traducător din și în limba română",
    };
    const START: Localized = Localized {
        default: "Hi! Send me a message and I will reply with its translation.",
        ru: "Привет! Отправьте мне сообщение, и я отвечу его переводом.",
        ro: "Salut! Trimite-mi un mesaj și îți voi răspunde cu traducerea lui.",
    };
    const HELP: Localized = Localized {
        default: "Send any text or a photo with a caption. \
                  Text in Romanian is translated into your language, \
                  text in other languages is translated into Romanian.",
        ru: "Отправьте любой текст или фото с подписью. \
             Румынский текст переводится на ваш язык, \
             текст на других языках переводится на румынский.",
        ro: "Trimite orice text sau o fotografie cu descriere. \
             Textul în română este tradus în limba ta, \
             textul în alte limbi este tradus în română.",
    };
    const TRANSLATION_FAILED: Localized = Localized {
        default: "Sorry, the translation failed. Please try again later.",
        ru: "Извините, перевести не удалось. Попробуйте позже.",
        ro: "Ne pare rău, traducerea a eșuat. Încearcă din nou mai târziu.",
    };
    const NOTHING_TO_TRANSLATE: Localized = Localized {
        default: "There is nothing to translate.",
        ru: "Нечего переводить.",
        ro: "Nu este nimic de tradus.",
    };

    match key {
        ReplyKey::Description => &DESCRIPTION,
        ReplyKey::ShortDescription => &SHORT_DESCRIPTION,
        ReplyKey::Start => &START,
        ReplyKey::Help => &HELP,
        ReplyKey::TranslationFailed => &TRANSLATION_FAILED,
        ReplyKey::NothingToTranslate => &NOTHING_TO_TRANSLATE,
    }
}

/// Commands in menu order, described in `locale` (default when `None`).
pub fn command_sequence(locale: Option<Locale>) -> Vec<CommandSpec> {
    COMMANDS
        .iter()
        .map(|(name, text)| CommandSpec {
            name: *name,
            description: text.get(locale),
        })
        .collect()
}

pub fn reply(key: ReplyKey, locale: Option<Locale>) -> &'static str {
    reply_table(key).get(locale)
}

pub fn description(locale: Option<Locale>) -> &'static str {
    reply(ReplyKey::Description, locale)
}

pub fn short_description(locale: Option<Locale>) -> &'static str {
    reply(ReplyKey::ShortDescription, locale)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KEYS: [ReplyKey; 6] = [
        ReplyKey::Description,
        ReplyKey::ShortDescription,
        ReplyKey::Start,
        ReplyKey::Help,
        ReplyKey::TranslationFailed,
        ReplyKey::NothingToTranslate,
    ];

    fn names(locale: Option<Locale>) -> Vec<&'static str> {
        command_sequence(locale).into_iter().map(|c| c.name).collect()
    }

    #[test]
    fn every_locale_has_the_default_command_set() {
        let default = names(None);
        assert!(!default.is_empty());
        for locale in Locale::SUPPORTED {
            assert_eq!(names(Some(locale)), default, "locale {locale:?}");
        }
    }

    #[test]
    fn command_descriptions_are_localized_and_non_empty() {
        for locale in Locale::all() {
            for cmd in command_sequence(locale) {
                assert!(!cmd.description.trim().is_empty());
            }
        }
        let en = command_sequence(None);
        let ru = command_sequence(Some(Locale::Ru));
        assert_ne!(en[0].description, ru[0].description);
    }

    #[test]
    fn command_names_are_valid_telegram_commands() {
        for cmd in command_sequence(None) {
            assert!((1..=32).contains(&cmd.name.len()));
            assert!(cmd
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
    }

    #[test]
    fn replies_exist_for_every_locale() {
        for key in ALL_KEYS {
            for locale in Locale::all() {
                assert!(!reply(key, locale).trim().is_empty(), "{key:?} {locale:?}");
            }
        }
    }

    #[test]
    fn short_description_fits_platform_limit() {
        for locale in Locale::all() {
            assert!(short_description(locale).chars().count() <= 120);
            assert!(description(locale).chars().count() <= 512);
        }
    }
}
