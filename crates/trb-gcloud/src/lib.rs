//! Google Cloud Translation adapter.
//!
//! Uses the v2 `translate` REST endpoint with an API key. Text in any language
//! goes to the configured target language; text already in the target
//! language goes to the requester's language instead.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use trb_core::{
    errors::Error,
    ports::{TranslationContext, Translator},
    Result,
};

const ENDPOINT: &str = "https://translation.googleapis.com/language/translate/v2";

#[derive(Clone, Debug)]
pub struct GcloudTranslator {
    api_key: String,
    target_language: String,
    fallback_language: String,
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
    #[serde(default)]
    detected_source_language: Option<String>,
}

impl GcloudTranslator {
    pub fn new(
        api_key: impl Into<String>,
        target_language: impl Into<String>,
        fallback_language: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("gcloud http client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            target_language: target_language.into(),
            fallback_language: fallback_language.into(),
            endpoint: ENDPOINT.to_string(),
            http,
        })
    }

    /// Language to use when the input is already in the target language.
    fn reverse_target(&self, ctx: &TranslationContext) -> String {
        match ctx.locale {
            Some(l) if l.code() != self.target_language => l.code().to_string(),
            _ => self.fallback_language.clone(),
        }
    }

    async fn call(&self, text: &str, target: &str) -> Result<Translation> {
        let resp = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&TranslateRequest {
                q: text,
                target,
                format: "text",
            })
            .send()
            .await
            .map_err(|e| Error::External(format!("gcloud request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "gcloud translation failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("gcloud read error: {e}")))?;
        parse_response(&body)
    }
}

fn parse_response(body: &str) -> Result<Translation> {
    let parsed: TranslateResponse = serde_json::from_str(body)?;
    let first = parsed
        .data
        .translations
        .into_iter()
        .next()
        .ok_or_else(|| Error::External("gcloud returned no translations".to_string()))?;
    if first.translated_text.trim().is_empty() {
        return Err(Error::External(
            "gcloud translation returned empty text".to_string(),
        ));
    }
    Ok(first)
}

fn same_language(detected: Option<&str>, target: &str) -> bool {
    let Some(detected) = detected else {
        return false;
    };
    let primary = detected.split('-').next().unwrap_or(detected);
    primary.eq_ignore_ascii_case(target)
}

#[async_trait]
impl Translator for GcloudTranslator {
    async fn translate(&self, text: &str, ctx: &TranslationContext) -> Result<String> {
        let first = self.call(text, &self.target_language).await?;
        if !same_language(
            first.detected_source_language.as_deref(),
            &self.target_language,
        ) {
            return Ok(first.translated_text);
        }

        let target = self.reverse_target(ctx);
        tracing::debug!(%target, "input already in target language; translating back");
        Ok(self.call(text, &target).await?.translated_text)
    }
}
