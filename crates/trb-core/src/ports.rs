use async_trait::async_trait;

use crate::{domain::Locale, Result};

/// Per-job data handed to the translator alongside the text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranslationContext {
    /// Locale of the requesting user; decides the target language when the
    /// input is already in the bot's target language.
    pub locale: Option<Locale>,
}

/// Hexagonal port for the translation backend.
///
/// Only ever called from inside the offload pool's worker.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, ctx: &TranslationContext) -> Result<String>;
}
