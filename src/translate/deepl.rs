use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::translate::provider::{ProviderError, TranslationProvider};

pub const DEFAULT_DEEPL_BASE_URL: &str = "https://api-free.deepl.com";
const NAME: &str = "DeepL";

/// DeepL answers 456 once the account's character quota is used up.
const QUOTA_EXCEEDED_STATUS: u16 = 456;

#[derive(Debug, Clone)]
pub struct DeeplProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl DeeplProvider {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v2/translate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: [&'a str; 1],
    source_lang: String,
    target_lang: String,
    tag_handling: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

#[async_trait]
impl TranslationProvider for DeeplProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::InvalidResponse {
                provider: NAME.to_owned(),
                message: "DEEPL_API_KEY is not set".to_owned(),
            });
        };

        let body = TranslateRequest {
            text: [text],
            source_lang: from.to_ascii_uppercase(),
            target_lang: map_target_lang(to),
            tag_handling: "html",
        };
        let response = self
            .client
            .post(self.endpoint())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("DeepL-Auth-Key {api_key}"),
            )
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Request {
                provider: NAME.to_owned(),
                source,
            })?;

        let status = response.status();
        if status.as_u16() == QUOTA_EXCEEDED_STATUS {
            return Err(ProviderError::QuotaExceeded {
                provider: NAME.to_owned(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: NAME.to_owned(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TranslateResponse =
            response.json().await.map_err(|err| ProviderError::InvalidResponse {
                provider: NAME.to_owned(),
                message: err.to_string(),
            })?;
        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: NAME.to_owned(),
                message: "empty `translations` array".to_owned(),
            })
    }
}

pub fn map_target_lang(lang: &str) -> String {
    let mapped = match lang.trim().to_ascii_lowercase().as_str() {
        "pt" => "PT-BR",
        "en" => "EN-US",
        "es" => "ES",
        "fr" => "FR",
        "de" => "DE",
        "it" => "IT",
        "ja" => "JA",
        "ko" => "KO",
        "zh" => "ZH-HANS",
        "ru" => "RU",
        _ => return lang.trim().to_ascii_uppercase(),
    };
    mapped.to_owned()
}
